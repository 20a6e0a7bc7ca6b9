/// Oversized bunches are split into byte-aligned partials and rebuilt whole,
/// or not at all

use std::time::Instant;

use skein_shared::{
    channels::partial::split_bunch, Bunch, ChannelConfig, ChannelKind, Connection,
    ConnectionConfig, ConnectionEvent, DecodeError, HostType, PartialFlags, Payload,
};
use skein_test::{
    init_logger, packet_of, raw_bunch, ConnectionPair, LocalTransport, Side, TestReferenceCache,
};

const KB: usize = 1024;

fn large_config() -> ConnectionConfig {
    let mut config = ConnectionConfig::default();
    config.channel.max_bunch_bytes = 64 * KB;
    config.channel.max_assembled_bytes = 512 * KB;
    config.max_packet_bytes = 64 * KB + 64;
    config
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

fn stream_payloads(events: &[ConnectionEvent]) -> Vec<Payload> {
    events
        .iter()
        .filter_map(|event| match event {
            ConnectionEvent::Bunch { payload, .. } => Some(payload.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn large_bunch_splits_into_five_partials() {
    let config = ChannelConfig {
        max_bunch_bytes: 64 * KB,
        ..ChannelConfig::default()
    };
    let bunch = Bunch::reliable(Payload::from_bytes(patterned(300 * KB)));

    let parts = split_bunch(bunch, &config, 0).bunches;

    assert_eq!(parts.len(), 5);
    assert_eq!(
        parts[0].partial,
        Some(PartialFlags {
            first: true,
            last: false
        })
    );
    assert_eq!(
        parts[4].partial,
        Some(PartialFlags {
            first: false,
            last: true
        })
    );
    for part in &parts[..4] {
        assert!(part.payload.is_byte_aligned());
        assert_eq!(part.payload.byte_length(), 64 * KB);
    }
    assert_eq!(parts[4].payload.byte_length(), 300 * KB - 4 * 64 * KB);
}

#[test]
fn large_bunch_is_rebuilt_bit_for_bit() {
    init_logger();
    let mut pair = ConnectionPair::new(large_config());
    let id = pair.client.open_channel(ChannelKind::Data).unwrap();
    let original = Payload::from_bytes(patterned(300 * KB));

    let range = pair
        .client
        .send_bunch(pair.now, id, Bunch::reliable(original.clone()))
        .unwrap();
    assert_eq!(range.first, 0);
    assert_eq!(range.last, 4);

    assert_eq!(pair.deliver(Side::Client), 5);

    let payloads = stream_payloads(&pair.server.take_events());
    assert_eq!(payloads, vec![original]);
}

#[test]
fn lost_reliable_partial_holds_back_the_whole_bunch() {
    init_logger();
    let mut pair = ConnectionPair::new(large_config());
    let id = pair.client.open_channel(ChannelKind::Data).unwrap();
    let original = Payload::from_bytes(patterned(300 * KB));

    pair.client
        .send_bunch(pair.now, id, Bunch::reliable(original.clone()))
        .unwrap();
    pair.deliver_with(Side::Client, |packet| packet != 2);

    let events = pair.server.take_events();
    assert!(stream_payloads(&events).is_empty());

    // the nak already queued the missing slice again
    pair.deliver(Side::Client);
    let payloads = stream_payloads(&pair.server.take_events());
    assert_eq!(payloads, vec![original]);
    assert!(pair.server.is_connected());
}

#[test]
fn lost_unreliable_partial_drops_the_bunch() {
    init_logger();
    let mut config = ConnectionConfig::default();
    config.channel.max_bunch_bytes = 100;
    config.channel.partial_reliable_threshold = Some(8);
    config.max_packet_bytes = 120;
    let mut pair = ConnectionPair::new(config);

    let id = pair.client.open_channel(ChannelKind::Data).unwrap();
    pair.client
        .send_bunch(pair.now, id, Bunch::new(Payload::from_bytes(vec![1])))
        .unwrap();
    pair.deliver(Side::Client);
    pair.server.take_events();

    pair.client
        .send_bunch(pair.now, id, Bunch::new(Payload::from_bytes(patterned(350))))
        .unwrap();
    pair.client.flush();
    let packets = pair.client.transport_mut().take_sent();
    assert_eq!(packets.len(), 4);

    let mut acked = Vec::new();
    for (index, data) in packets.iter().filter(|(index, _)| *index != packets[1].0) {
        let receipt = pair
            .server
            .receive_packet(pair.now, *index, data, &mut pair.server_refs)
            .unwrap();
        acked.push(receipt.should_ack);
    }

    assert!(stream_payloads(&pair.server.take_events()).is_empty());
    assert_eq!(acked, vec![true, false, false]);
    assert!(pair.server.is_connected());
    assert!(!pair.client.is_replication_paused(id));
}

#[test]
fn many_unreliable_partials_are_sent_reliably() {
    init_logger();
    let mut config = ConnectionConfig::default();
    config.channel.max_bunch_bytes = 100;
    config.channel.partial_reliable_threshold = Some(4);
    config.max_packet_bytes = 120;
    let mut pair = ConnectionPair::new(config);

    let id = pair.client.open_channel(ChannelKind::Data).unwrap();
    pair.client
        .send_bunch(pair.now, id, Bunch::new(Payload::from_bytes(vec![1])))
        .unwrap();
    pair.deliver(Side::Client);

    let original = Payload::from_bytes(patterned(450));
    pair.client
        .send_bunch(pair.now, id, Bunch::new(original.clone()))
        .unwrap();
    assert!(pair.client.is_replication_paused(id));

    // the third slice is lost and resent after its nak
    let mut seen = 0;
    pair.deliver_with(Side::Client, |_| {
        seen += 1;
        seen != 3
    });
    pair.deliver(Side::Client);

    let payloads = stream_payloads(&pair.server.take_events());
    assert_eq!(payloads.last(), Some(&original));
    assert!(!pair.client.is_replication_paused(id));
}

#[test]
fn unaligned_partial_breaks_the_channel() {
    init_logger();
    let mut server =
        Connection::new(HostType::Server, ConnectionConfig::default(), LocalTransport::new())
            .unwrap();
    let mut refs = TestReferenceCache::new();
    let now = Instant::now();

    let mut first = raw_bunch(1, ChannelKind::Data, 1, true, &[]);
    first.payload = Payload::new(vec![0xFF, 0x01], 13);
    first.partial = Some(PartialFlags {
        first: true,
        last: false,
    });
    server
        .receive_packet(now, 0, &packet_of(&[first]), &mut refs)
        .unwrap();

    let events = server.take_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, ConnectionEvent::ChannelBroken { .. })));

    // later traffic on the broken channel is ignored
    let next = raw_bunch(1, ChannelKind::Data, 2, false, &[5]);
    server
        .receive_packet(now, 1, &packet_of(&[next]), &mut refs)
        .unwrap();
    assert!(stream_payloads(&server.take_events()).is_empty());
    assert!(server.is_connected());
}

fn slice_of(mut bunch: Bunch, reliable: bool, first: bool, last: bool) -> Bunch {
    bunch.reliable = reliable;
    bunch.partial = Some(PartialFlags { first, last });
    bunch
}

#[test]
fn unreliable_slice_cannot_interrupt_a_reliable_assembly() {
    init_logger();
    let mut server =
        Connection::new(HostType::Server, ConnectionConfig::default(), LocalTransport::new())
            .unwrap();
    let mut refs = TestReferenceCache::new();
    let now = Instant::now();

    let first = slice_of(raw_bunch(1, ChannelKind::Data, 1, true, &[1; 4]), true, true, false);
    server
        .receive_packet(now, 0, &packet_of(&[first]), &mut refs)
        .unwrap();

    let intruder = slice_of(raw_bunch(1, ChannelKind::Data, 0, false, &[2]), false, false, true);
    server
        .receive_packet(now, 1, &packet_of(&[intruder]), &mut refs)
        .unwrap();

    let events = server.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        ConnectionEvent::ChannelBroken {
            error: DecodeError::UnreliablePartialOverReliable { index: 1, .. },
            ..
        }
    )));
    assert!(stream_payloads(&events).is_empty());
    assert!(server.is_connected());
}

#[test]
fn reliable_slice_abandons_an_unreliable_assembly_unacked() {
    init_logger();
    let mut server =
        Connection::new(HostType::Server, ConnectionConfig::default(), LocalTransport::new())
            .unwrap();
    let mut refs = TestReferenceCache::new();
    let now = Instant::now();

    let open = raw_bunch(1, ChannelKind::Data, 1, true, &[0]);
    server
        .receive_packet(now, 0, &packet_of(&[open]), &mut refs)
        .unwrap();
    server.take_events();

    let first = slice_of(raw_bunch(1, ChannelKind::Data, 0, false, &[1]), false, true, false);
    let receipt = server
        .receive_packet(now, 1, &packet_of(&[first]), &mut refs)
        .unwrap();
    assert!(receipt.should_ack);

    let other = slice_of(raw_bunch(1, ChannelKind::Data, 2, false, &[2]), true, false, true);
    let receipt = server
        .receive_packet(now, 2, &packet_of(&[other]), &mut refs)
        .unwrap();
    assert!(!receipt.should_ack);

    let events = server.take_events();
    assert!(stream_payloads(&events).is_empty());
    assert!(!events
        .iter()
        .any(|event| matches!(event, ConnectionEvent::ChannelBroken { .. })));
    assert!(server.is_connected());
}

#[test]
fn oversized_assembly_is_fatal() {
    init_logger();
    let mut config = ConnectionConfig::default();
    config.channel.max_assembled_bytes = 150;
    let mut server = Connection::new(HostType::Server, config, LocalTransport::new()).unwrap();
    let mut refs = TestReferenceCache::new();
    let now = Instant::now();

    let mut first = raw_bunch(1, ChannelKind::Data, 1, true, &[0; 100]);
    first.partial = Some(PartialFlags {
        first: true,
        last: false,
    });
    let mut second = raw_bunch(1, ChannelKind::Data, 2, false, &[0; 100]);
    second.partial = Some(PartialFlags {
        first: false,
        last: true,
    });

    let result = server.receive_packet(now, 0, &packet_of(&[first, second]), &mut refs);

    assert!(result.is_err());
    assert!(!server.is_connected());
    assert!(server.take_events().iter().any(|event| matches!(
        event,
        ConnectionEvent::Disconnected { .. }
    )));
}
