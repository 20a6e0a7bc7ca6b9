/// Entity channels: content blocks, queueing behind unresolved references,
/// and draining generations

use skein_shared::{
    Bunch, ChannelId, ChannelKind, CloseReason, ConnectionConfig,
    ConnectionEvent, NetRefId, ObjectHandle, Payload, ReplicationEvent,
};
use skein_test::{init_logger, ConnectionPair, Side};

const ENTITY: NetRefId = NetRefId(10);
const ENTITY_TYPE: NetRefId = NetRefId(100);
const SUB: NetRefId = NetRefId(20);
const SUB_TYPE: NetRefId = NetRefId(200);

fn pair() -> ConnectionPair {
    pair_with(ConnectionConfig::default())
}

fn pair_with(config: ConnectionConfig) -> ConnectionPair {
    let mut pair = ConnectionPair::new(config);
    pair.client_refs.register(ENTITY_TYPE, ObjectHandle(1));
    pair
}

fn bytes(byte: u8) -> Payload {
    Payload::from_bytes(vec![byte])
}

fn send(pair: &mut ConnectionPair, id: ChannelId, mut bunch: Bunch) {
    bunch.reliable = true;
    pair.server.send_bunch(pair.now, id, bunch).unwrap();
}

fn send_entity_block(pair: &mut ConnectionPair, id: ChannelId, payload: Payload) {
    let bunch = {
        let mut writer = pair.server.entity_block_writer(id).unwrap();
        writer.write_entity_block(&payload);
        writer.finish()
    };
    send(pair, id, bunch);
}

fn send_sub_object_block(pair: &mut ConnectionPair, id: ChannelId, payload: Payload) {
    let bunch = {
        let mut writer = pair.server.entity_block_writer(id).unwrap();
        writer.write_sub_object_block(SUB, SUB_TYPE, &payload);
        writer.finish()
    };
    send(pair, id, bunch);
}

/// A compact trace of replication and channel events, in order
fn trace(events: &[ConnectionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ConnectionEvent::Replication(event) => Some(match event {
                ReplicationEvent::EntityOpened { .. } => "open".to_string(),
                ReplicationEvent::EntityUpdated { payload, .. } => {
                    format!("entity {}", payload.bytes()[0])
                }
                ReplicationEvent::SubObjectCreated { .. } => "create".to_string(),
                ReplicationEvent::SubObjectUpdated { payload, .. } => {
                    format!("sub {}", payload.bytes()[0])
                }
                ReplicationEvent::SubObjectDestroyed { .. } => "destroy".to_string(),
            }),
            ConnectionEvent::ChannelClosed { .. } => Some("closed".to_string()),
            _ => None,
        })
        .collect()
}

#[test]
fn entity_is_instantiated_from_its_type() {
    init_logger();
    let mut pair = pair();
    let id = pair.server.open_entity_channel(pair.now, ENTITY, ENTITY_TYPE).unwrap();

    send_entity_block(&mut pair, id, bytes(7));
    pair.deliver(Side::Server);

    let events = pair.client.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        ConnectionEvent::ChannelOpened {
            kind: ChannelKind::Entity,
            ..
        }
    )));
    assert_eq!(trace(&events), vec!["open", "entity 7"]);

    let instantiated = pair.client_refs.instantiated();
    assert_eq!(instantiated.len(), 1);
    assert_eq!(instantiated[0].0, ENTITY);
    assert_eq!(instantiated[0].2, None);
}

#[test]
fn sub_object_is_created_then_updated_then_destroyed() {
    init_logger();
    let mut pair = pair();
    pair.client_refs.register(SUB_TYPE, ObjectHandle(2));
    let id = pair.server.open_entity_channel(pair.now, ENTITY, ENTITY_TYPE).unwrap();

    send_sub_object_block(&mut pair, id, bytes(1));
    send_sub_object_block(&mut pair, id, bytes(2));
    let bunch = {
        let mut writer = pair.server.entity_block_writer(id).unwrap();
        writer.destroy_sub_object(SUB);
        writer.finish()
    };
    send(&mut pair, id, bunch);
    pair.deliver(Side::Server);

    let events = pair.client.take_events();
    assert_eq!(
        trace(&events),
        vec!["open", "create", "sub 1", "sub 2", "destroy"]
    );

    let entity = pair.client_refs.instantiated()[0].1;
    assert!(events.iter().all(|event| match event {
        ConnectionEvent::Replication(event) => event.entity() == entity,
        _ => true,
    }));

    let created = pair.client_refs.instantiated()[1];
    assert_eq!(created.0, SUB);
    let destroyed = events.iter().find_map(|event| match event {
        ConnectionEvent::Replication(ReplicationEvent::SubObjectDestroyed { object, .. }) => {
            Some(*object)
        }
        _ => None,
    });
    assert_eq!(destroyed, Some(Some(created.1)));
}

#[test]
fn queued_bunches_replay_in_arrival_order() {
    init_logger();
    let mut pair = pair();
    let id = pair.server.open_entity_channel(pair.now, ENTITY, ENTITY_TYPE).unwrap();

    send_sub_object_block(&mut pair, id, bytes(1));
    send_entity_block(&mut pair, id, bytes(2));
    send_entity_block(&mut pair, id, bytes(3));
    pair.deliver(Side::Server);

    // only the open header could be processed
    assert_eq!(trace(&pair.client.take_events()), vec!["open"]);

    pair.client.tick(pair.now, &mut pair.client_refs).unwrap();
    assert!(trace(&pair.client.take_events()).is_empty());

    pair.client_refs.register(SUB_TYPE, ObjectHandle(2));
    pair.client.tick(pair.now, &mut pair.client_refs).unwrap();

    assert_eq!(
        trace(&pair.client.take_events()),
        vec!["create", "sub 1", "entity 2", "entity 3"]
    );
}

#[test]
fn replay_budget_spreads_queued_bunches_over_ticks() {
    init_logger();
    let mut config = ConnectionConfig::default();
    config.entity.queued_bunch_budget = 1;
    let mut pair = pair_with(config);
    let id = pair.server.open_entity_channel(pair.now, ENTITY, ENTITY_TYPE).unwrap();

    send_sub_object_block(&mut pair, id, bytes(1));
    send_entity_block(&mut pair, id, bytes(2));
    send_entity_block(&mut pair, id, bytes(3));
    pair.deliver(Side::Server);
    assert_eq!(trace(&pair.client.take_events()), vec!["open"]);

    pair.client_refs.register(SUB_TYPE, ObjectHandle(2));
    let mut per_tick = Vec::new();
    for _ in 0..4 {
        pair.client.tick(pair.now, &mut pair.client_refs).unwrap();
        per_tick.push(trace(&pair.client.take_events()));
    }

    assert_eq!(
        per_tick,
        vec![
            vec!["create".to_string(), "sub 1".to_string()],
            vec!["entity 2".to_string()],
            vec!["entity 3".to_string()],
            Vec::new(),
        ]
    );
}

#[test]
fn broken_reference_skips_only_its_block() {
    init_logger();
    let mut pair = pair();
    let broken_type = NetRefId(300);
    pair.client_refs.mark_broken(broken_type);
    let id = pair.server.open_entity_channel(pair.now, ENTITY, ENTITY_TYPE).unwrap();

    let bunch = {
        let mut writer = pair.server.entity_block_writer(id).unwrap();
        writer
            .write_sub_object_block(NetRefId(30), broken_type, &bytes(4))
            .write_entity_block(&bytes(5));
        writer.finish()
    };
    send(&mut pair, id, bunch);
    pair.deliver(Side::Server);

    assert_eq!(trace(&pair.client.take_events()), vec!["open", "entity 5"]);
}

#[test]
fn new_generation_waits_for_the_draining_one() {
    init_logger();
    let mut pair = pair();
    let first = pair.server.open_entity_channel(pair.now, ENTITY, ENTITY_TYPE).unwrap();

    send_sub_object_block(&mut pair, first, bytes(1));
    send_entity_block(&mut pair, first, bytes(2));
    pair.server
        .close_channel(pair.now, first, CloseReason::RelevancyLost)
        .unwrap();
    pair.deliver(Side::Server);

    let events = pair.client.take_events();
    assert_eq!(trace(&events), vec!["open"]);
    assert!(events
        .iter()
        .any(|event| matches!(event, ConnectionEvent::ChannelReleased { .. })));
    assert_eq!(pair.client.draining_count(), 1);

    let second = pair.server.open_entity_channel(pair.now, ENTITY, ENTITY_TYPE).unwrap();
    assert_ne!(second, first);
    send_entity_block(&mut pair, second, bytes(5));
    pair.deliver(Side::Server);
    assert!(trace(&pair.client.take_events()).is_empty());

    pair.client_refs.register(SUB_TYPE, ObjectHandle(2));
    pair.client.tick(pair.now, &mut pair.client_refs).unwrap();

    let events = pair.client.take_events();
    assert_eq!(
        trace(&events),
        vec!["create", "sub 1", "entity 2", "closed", "open", "entity 5"]
    );
    assert_eq!(pair.client.draining_count(), 0);

    let channels: Vec<u16> = events
        .iter()
        .filter_map(|event| match event {
            ConnectionEvent::Replication(event) => Some(event.channel().index),
            _ => None,
        })
        .collect();
    assert_eq!(channels.first(), Some(&first.index));
    assert_eq!(channels.last(), Some(&second.index));
}
