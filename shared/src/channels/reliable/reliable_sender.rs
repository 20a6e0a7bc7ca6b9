use std::{collections::VecDeque, time::Duration, time::Instant};

use crate::{bunch::Bunch, ChannelIndex, FatalError, PacketIndex};

/// A reliable bunch waiting for its packet to be acknowledged
pub struct OutgoingReliable {
    pub bunch: Bunch,
    pub acked: bool,
    pub sent_at: Instant,
}

/// Outgoing reliable bunches of one channel, in send (and sequence) order
pub struct ReliableSender {
    list: VecDeque<OutgoingReliable>,
}

impl ReliableSender {
    pub fn new() -> Self {
        Self {
            list: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }

    /// One slot is always held back for a close bunch, so a channel that is
    /// full of content can still be closed.
    pub fn check_capacity(
        &self,
        index: ChannelIndex,
        count: usize,
        is_close: bool,
        capacity: usize,
    ) -> Result<(), FatalError> {
        if self.would_overflow(count, is_close, capacity) {
            return Err(FatalError::ReliableBufferOverflow {
                index,
                pending: self.list.len() + count,
                capacity,
            });
        }
        Ok(())
    }

    pub fn would_overflow(&self, count: usize, is_close: bool, capacity: usize) -> bool {
        self.list.len() + count >= capacity + is_close as usize
    }

    pub fn push(&mut self, bunch: Bunch, now: Instant) {
        self.list.push_back(OutgoingReliable {
            bunch,
            acked: false,
            sent_at: now,
        });
    }

    /// Returns whether any bunch rode in `packet_index`
    pub fn mark_acked(&mut self, packet_index: PacketIndex) -> bool {
        let mut found = false;
        for entry in self.list.iter_mut() {
            if entry.bunch.packet_index == Some(packet_index) {
                entry.acked = true;
                found = true;
            }
        }
        found
    }

    /// Removes acknowledged bunches from the head while they are contiguous
    pub fn prune_acked(&mut self) -> Vec<Bunch> {
        let mut pruned = Vec::new();
        while self.list.front().map(|entry| entry.acked).unwrap_or(false) {
            if let Some(entry) = self.list.pop_front() {
                pruned.push(entry.bunch);
            }
        }
        pruned
    }

    pub fn unacked_count(&self) -> usize {
        self.list.iter().filter(|entry| !entry.acked).count()
    }

    pub fn unacked_in_packet(
        &mut self,
        packet_index: PacketIndex,
    ) -> impl Iterator<Item = &mut OutgoingReliable> {
        self.list
            .iter_mut()
            .filter(move |entry| !entry.acked && entry.bunch.packet_index == Some(packet_index))
    }

    pub fn unacked_older_than(
        &mut self,
        now: Instant,
        timeout: Duration,
    ) -> impl Iterator<Item = &mut OutgoingReliable> {
        self.list.iter_mut().filter(move |entry| {
            !entry.acked && now.saturating_duration_since(entry.sent_at) > timeout
        })
    }
}

impl Default for ReliableSender {
    fn default() -> Self {
        Self::new()
    }
}
