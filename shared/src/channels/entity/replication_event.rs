use crate::{bunch::Payload, ChannelId, NetRefId, ObjectHandle};

/// What the receiving end of an entity channel hands to the replication layer.
/// Payloads are opaque property data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplicationEvent {
    EntityOpened {
        channel: ChannelId,
        reference: NetRefId,
        entity: ObjectHandle,
    },
    EntityUpdated {
        channel: ChannelId,
        entity: ObjectHandle,
        payload: Payload,
    },
    SubObjectCreated {
        channel: ChannelId,
        entity: ObjectHandle,
        reference: NetRefId,
        object: ObjectHandle,
    },
    SubObjectUpdated {
        channel: ChannelId,
        entity: ObjectHandle,
        reference: NetRefId,
        object: ObjectHandle,
        payload: Payload,
    },
    SubObjectDestroyed {
        channel: ChannelId,
        entity: ObjectHandle,
        reference: NetRefId,
        object: Option<ObjectHandle>,
    },
}

impl ReplicationEvent {
    pub fn channel(&self) -> ChannelId {
        match self {
            ReplicationEvent::EntityOpened { channel, .. }
            | ReplicationEvent::EntityUpdated { channel, .. }
            | ReplicationEvent::SubObjectCreated { channel, .. }
            | ReplicationEvent::SubObjectUpdated { channel, .. }
            | ReplicationEvent::SubObjectDestroyed { channel, .. } => *channel,
        }
    }

    pub fn entity(&self) -> ObjectHandle {
        match self {
            ReplicationEvent::EntityOpened { entity, .. }
            | ReplicationEvent::EntityUpdated { entity, .. }
            | ReplicationEvent::SubObjectCreated { entity, .. }
            | ReplicationEvent::SubObjectUpdated { entity, .. }
            | ReplicationEvent::SubObjectDestroyed { entity, .. } => *entity,
        }
    }
}
