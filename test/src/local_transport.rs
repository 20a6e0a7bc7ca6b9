/// In-memory packet transport for tests
/// Keeps every sent packet until the test hands it to the other end

use std::collections::VecDeque;

use skein_shared::{PacketIndex, PacketTransport};

#[derive(Default)]
pub struct LocalTransport {
    next_index: PacketIndex,
    outgoing: VecDeque<(PacketIndex, Vec<u8>)>,
    sent_total: usize,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every packet sent since the last call
    pub fn take_sent(&mut self) -> Vec<(PacketIndex, Vec<u8>)> {
        self.outgoing.drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.outgoing.len()
    }

    pub fn sent_total(&self) -> usize {
        self.sent_total
    }
}

impl PacketTransport for LocalTransport {
    fn next_packet_index(&self) -> PacketIndex {
        self.next_index
    }

    fn send_raw(&mut self, payload: Vec<u8>) -> PacketIndex {
        let index = self.next_index;
        self.next_index = self.next_index.wrapping_add(1);
        self.outgoing.push_back((index, payload));
        self.sent_total += 1;
        index
    }
}
