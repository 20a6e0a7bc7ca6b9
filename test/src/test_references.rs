use std::collections::{HashMap, HashSet};

use log::trace;

use skein_shared::{NetRefId, ObjectHandle, ReferenceCache};

/// Reference cache backed by plain maps. Tests register references as the
/// objects they name "arrive".
#[derive(Default)]
pub struct TestReferenceCache {
    resolved: HashMap<NetRefId, ObjectHandle>,
    broken: HashSet<NetRefId>,
    next_handle: u64,
    instantiated: Vec<(NetRefId, ObjectHandle, Option<ObjectHandle>)>,
}

impl TestReferenceCache {
    pub fn new() -> Self {
        Self {
            next_handle: 1000,
            ..Default::default()
        }
    }

    pub fn register(&mut self, reference: NetRefId, handle: ObjectHandle) {
        self.resolved.insert(reference, handle);
    }

    pub fn mark_broken(&mut self, reference: NetRefId) {
        self.broken.insert(reference);
    }

    /// (reference, created object, owner) for every `instantiate` call that
    /// produced an object
    pub fn instantiated(&self) -> &[(NetRefId, ObjectHandle, Option<ObjectHandle>)] {
        &self.instantiated
    }
}

impl ReferenceCache for TestReferenceCache {
    fn resolve(&self, reference: NetRefId) -> Option<ObjectHandle> {
        self.resolved.get(&reference).copied()
    }

    fn is_broken(&self, reference: NetRefId) -> bool {
        self.broken.contains(&reference)
    }

    fn instantiate(
        &mut self,
        reference: NetRefId,
        type_handle: ObjectHandle,
        owner: Option<ObjectHandle>,
    ) -> Option<ObjectHandle> {
        self.next_handle += 1;
        let handle = ObjectHandle(self.next_handle);
        trace!("instantiating {reference:?} of type {type_handle:?} as {handle:?}");
        self.resolved.insert(reference, handle);
        self.instantiated.push((reference, handle, owner));
        Some(handle)
    }
}
