use crate::{NetRefId, ObjectHandle};

/// Maps stable reference ids to live objects.
///
/// An id that does not resolve and is not broken is simply not ready yet;
/// the entity channel queues behind it instead of failing.
pub trait ReferenceCache {
    fn resolve(&self, reference: NetRefId) -> Option<ObjectHandle>;

    /// The id will never resolve
    fn is_broken(&self, reference: NetRefId) -> bool;

    /// Creates the object for `reference` from an already resolved type,
    /// attached to `owner` when it is a sub-object
    fn instantiate(
        &mut self,
        reference: NetRefId,
        type_handle: ObjectHandle,
        owner: Option<ObjectHandle>,
    ) -> Option<ObjectHandle>;
}
