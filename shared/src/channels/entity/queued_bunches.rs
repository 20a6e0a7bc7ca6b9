use std::{collections::VecDeque, time::Instant};

use crate::{bunch::Bunch, NetRefId, ReferenceCache};

/// A received bunch that could not be processed yet, along with where to
/// resume reading it and which references it is waiting on
pub struct QueuedBunch {
    pub bunch: Bunch,
    pub start_bit: u32,
    pub waiting_on: Vec<NetRefId>,
    pub queued_at: Instant,
    pub warned: bool,
}

impl QueuedBunch {
    pub fn new(bunch: Bunch, start_bit: u32, waiting_on: Vec<NetRefId>, queued_at: Instant) -> Self {
        Self {
            bunch,
            start_bit,
            waiting_on,
            queued_at,
            warned: false,
        }
    }

    /// Broken references count as ready: their blocks are skipped
    pub fn is_ready(&self, refs: &dyn ReferenceCache) -> bool {
        self.waiting_on
            .iter()
            .all(|reference| refs.resolve(*reference).is_some() || refs.is_broken(*reference))
    }
}

/// Bunches held back on an entity channel, in receipt order
#[derive(Default)]
pub struct QueuedBunches {
    queue: VecDeque<QueuedBunch>,
}

impl QueuedBunches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn push_back(&mut self, queued: QueuedBunch) {
        self.queue.push_back(queued);
    }

    /// Puts a partially replayed bunch back at the head
    pub fn push_front(&mut self, queued: QueuedBunch) {
        self.queue.push_front(queued);
    }

    pub fn front_mut(&mut self) -> Option<&mut QueuedBunch> {
        self.queue.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<QueuedBunch> {
        self.queue.pop_front()
    }
}
