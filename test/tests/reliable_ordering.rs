/// Reliable bunches reach the application in sequence order, exactly once,
/// however the packets carrying them are reordered or duplicated

use std::time::Instant;

use proptest::prelude::*;

use skein_shared::{
    ChannelKind, Connection, ConnectionConfig, ConnectionEvent, HostType, Payload,
};
use skein_test::{init_logger, packet_of, raw_bunch, LocalTransport, TestReferenceCache};

fn server() -> Connection<LocalTransport> {
    Connection::new(HostType::Server, ConnectionConfig::default(), LocalTransport::new()).unwrap()
}

fn delivered_payloads(events: &[ConnectionEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            ConnectionEvent::Bunch { payload, .. } => Some(payload.bytes()[0]),
            _ => None,
        })
        .collect()
}

/// Feeds reliable bunches with the given sequences to a server, one packet
/// each, on client channel 1
fn feed(server: &mut Connection<LocalTransport>, sequences: &[u16]) -> Vec<ConnectionEvent> {
    let mut refs = TestReferenceCache::new();
    let now = Instant::now();
    for (packet_index, sequence) in sequences.iter().enumerate() {
        let bunch = raw_bunch(1, ChannelKind::Data, *sequence, *sequence == 1, &[*sequence as u8]);
        let receipt = server
            .receive_packet(now, packet_index as u16, &packet_of(&[bunch]), &mut refs)
            .unwrap();
        assert!(receipt.should_ack);
    }
    server.take_events()
}

#[test]
fn gap_is_filled_before_dispatch() {
    init_logger();
    let mut server = server();

    let events = feed(&mut server, &[1, 2, 4]);
    assert_eq!(delivered_payloads(&events), vec![1, 2]);

    let channel = events
        .iter()
        .find_map(|event| match event {
            ConnectionEvent::ChannelOpened { channel, .. } => Some(*channel),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        server.channel(channel).map(|channel| channel.buffered_out_of_order()),
        Some(1)
    );

    let events = feed(&mut server, &[3]);
    assert_eq!(delivered_payloads(&events), vec![3, 4]);
}

#[test]
fn first_bunch_opens_the_channel() {
    init_logger();
    let mut server = server();

    let events = feed(&mut server, &[1]);
    assert!(matches!(
        events[0],
        ConnectionEvent::ChannelOpened {
            kind: ChannelKind::Data,
            ..
        }
    ));
}

#[test]
fn duplicates_are_discarded() {
    init_logger();
    let mut server = server();

    let events = feed(&mut server, &[1, 1, 3, 3, 2, 2, 3, 1]);
    assert_eq!(delivered_payloads(&events), vec![1, 2, 3]);
}

#[test]
fn bunches_before_the_open_wait_for_it() {
    init_logger();
    let mut server = server();

    let events = feed(&mut server, &[3, 2]);
    assert!(delivered_payloads(&events).is_empty());

    let events = feed(&mut server, &[1]);
    assert_eq!(delivered_payloads(&events), vec![1, 2, 3]);
}

#[test]
fn unreliable_bunch_on_unknown_channel_is_dropped() {
    init_logger();
    let mut server = server();
    let mut refs = TestReferenceCache::new();

    let mut bunch = raw_bunch(3, ChannelKind::Data, 0, false, &[9]);
    bunch.reliable = false;
    let receipt = server
        .receive_packet(Instant::now(), 0, &packet_of(&[bunch]), &mut refs)
        .unwrap();

    assert!(receipt.should_ack);
    assert!(server.take_events().is_empty());
    assert_eq!(server.channel_count(), 1);
}

fn reordered_with_duplicates() -> impl Strategy<Value = (usize, Vec<u16>)> {
    (2usize..48).prop_flat_map(|count| {
        let sequences: Vec<u16> = (1..=count as u16).collect();
        (
            Just(count),
            Just(sequences).prop_shuffle(),
            prop::collection::vec((0..count, 0..count), 0..12),
        )
            .prop_map(|(count, mut order, duplicates)| {
                for (source, position) in duplicates {
                    let sequence = order[source];
                    order.insert(position, sequence);
                }
                (count, order)
            })
    })
}

proptest! {
    #[test]
    fn dispatch_is_in_order_exactly_once((count, order) in reordered_with_duplicates()) {
        let mut server = server();
        let events = feed(&mut server, &order);

        let expected: Vec<u8> = (1..=count as u8).collect();
        prop_assert_eq!(delivered_payloads(&events), expected);
        prop_assert!(server.is_connected());
    }
}

#[test]
fn payload_survives_the_wire() {
    init_logger();
    let mut server = server();
    let mut refs = TestReferenceCache::new();

    let mut bunch = raw_bunch(1, ChannelKind::Data, 1, true, &[]);
    bunch.payload = Payload::new(vec![0b1011_0110, 0b0000_0101], 11);
    server
        .receive_packet(Instant::now(), 0, &packet_of(&[bunch]), &mut refs)
        .unwrap();

    let payload = server.take_events().into_iter().find_map(|event| match event {
        ConnectionEvent::Bunch { payload, .. } => Some(payload),
        _ => None,
    });
    assert_eq!(payload, Some(Payload::new(vec![0b1011_0110, 0b0000_0101], 11)));
}
