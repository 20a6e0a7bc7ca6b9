use crate::{NetRefId, ObjectHandle};

/// What one end of an entity channel knows about a sub-object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplicationCursor {
    pub object_type: NetRefId,
    /// The local object, once known. Senders never fill this in.
    pub object: Option<ObjectHandle>,
    pub blocks: u32,
}

impl ReplicationCursor {
    pub fn new(object_type: NetRefId, object: Option<ObjectHandle>) -> Self {
        Self {
            object_type,
            object,
            blocks: 0,
        }
    }
}
