/// Control channel messages, queueing, and pre-open resends

use std::time::Duration;

use skein_shared::{
    ChannelKind, ConnectionConfig, ConnectionError, ConnectionEvent, ControlMessage,
    DisconnectReason, FatalError,
};
use skein_test::{init_logger, ConnectionPair, Side};

fn control_messages(events: &[ConnectionEvent]) -> Vec<ControlMessage> {
    events
        .iter()
        .filter_map(|event| match event {
            ConnectionEvent::ControlMessage(message) => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn hello() -> ControlMessage {
    ControlMessage::new(1, b"hello".to_vec())
}

#[test]
fn client_message_opens_the_control_channel() {
    init_logger();
    let mut pair = ConnectionPair::new(ConnectionConfig::default());

    let sent = pair.client.send_control_message(pair.now, hello()).unwrap();
    assert!(sent.is_some());
    pair.deliver(Side::Client);

    let events = pair.server.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        ConnectionEvent::ChannelOpened {
            kind: ChannelKind::Control,
            ..
        }
    )));
    assert_eq!(control_messages(&events), vec![hello()]);
}

#[test]
fn server_queues_until_the_client_opens() {
    init_logger();
    let mut pair = ConnectionPair::new(ConnectionConfig::default());

    for message_type in 10..13 {
        let sent = pair
            .server
            .send_control_message(pair.now, ControlMessage::new(message_type, vec![message_type]))
            .unwrap();
        assert!(sent.is_none());
    }
    pair.exchange();
    assert!(control_messages(&pair.client.take_events()).is_empty());

    pair.client.send_control_message(pair.now, hello()).unwrap();
    pair.exchange();

    let received: Vec<u8> = control_messages(&pair.client.take_events())
        .into_iter()
        .map(|message| message.message_type)
        .collect();
    assert_eq!(received, vec![10, 11, 12]);
}

#[test]
fn saturated_reliable_buffer_queues_messages_in_order() {
    init_logger();
    let mut config = ConnectionConfig::default();
    config.channel.reliable_buffer = 4;
    let mut pair = ConnectionPair::new(config);

    let mut queued = 0;
    for message_type in 0..6 {
        let sent = pair
            .client
            .send_control_message(pair.now, ControlMessage::new(message_type, Vec::new()))
            .unwrap();
        if sent.is_none() {
            queued += 1;
        }
    }
    assert_eq!(queued, 3);

    pair.exchange();

    let received: Vec<u8> = control_messages(&pair.server.take_events())
        .into_iter()
        .map(|message| message.message_type)
        .collect();
    assert_eq!(received, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn queue_overflow_is_fatal() {
    init_logger();
    let mut config = ConnectionConfig::default();
    config.control.max_queued_messages = 4;
    let mut pair = ConnectionPair::new(config);

    for message_type in 0..4 {
        pair.server
            .send_control_message(pair.now, ControlMessage::new(message_type, Vec::new()))
            .unwrap();
    }
    let result = pair
        .server
        .send_control_message(pair.now, ControlMessage::new(4, Vec::new()));

    assert!(matches!(
        result,
        Err(ConnectionError::Fatal(FatalError::ControlQueueOverflow { .. }))
    ));
    assert!(!pair.server.is_connected());
    assert!(pair.server.take_events().iter().any(|event| matches!(
        event,
        ConnectionEvent::Disconnected {
            reason: DisconnectReason::Fatal(FatalError::ControlQueueOverflow { .. })
        }
    )));
}

#[test]
fn oversized_message_is_fatal() {
    init_logger();
    let mut config = ConnectionConfig::default();
    config.channel.max_bunch_bytes = 64;
    config.max_packet_bytes = 128;
    let mut pair = ConnectionPair::new(config);

    let result = pair
        .client
        .send_control_message(pair.now, ControlMessage::new(1, vec![0; 100]));

    assert!(matches!(
        result,
        Err(ConnectionError::Fatal(FatalError::ControlMessageOverflow { .. }))
    ));
    assert!(!pair.client.is_connected());
}

#[test]
fn unanswered_messages_are_resent_before_the_open_is_acked() {
    init_logger();
    let mut pair = ConnectionPair::new(ConnectionConfig::default());

    pair.client.send_control_message(pair.now, hello()).unwrap();
    pair.client.flush();
    // lost without any feedback from the transport
    pair.client.transport_mut().take_sent();

    let _ = pair.client.tick(pair.now, &mut pair.client_refs);
    assert_eq!(pair.client.transport().pending(), 0);

    pair.advance(Duration::from_secs(2));
    pair.client.tick(pair.now, &mut pair.client_refs).unwrap();
    assert_eq!(pair.client.transport().pending(), 1);

    pair.deliver(Side::Client);
    assert_eq!(control_messages(&pair.server.take_events()), vec![hello()]);
}
