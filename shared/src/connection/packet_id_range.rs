use crate::{sequence_greater_than, sequence_less_than, PacketIndex};

/// The packets a (possibly split) bunch was sent in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketIdRange {
    pub first: PacketIndex,
    pub last: PacketIndex,
}

impl PacketIdRange {
    pub fn new(packet_index: PacketIndex) -> Self {
        Self {
            first: packet_index,
            last: packet_index,
        }
    }

    pub fn extended(self, packet_index: PacketIndex) -> Self {
        let mut range = self;
        if sequence_less_than(packet_index, range.first) {
            range.first = packet_index;
        }
        if sequence_greater_than(packet_index, range.last) {
            range.last = packet_index;
        }
        range
    }

    pub fn contains(&self, packet_index: PacketIndex) -> bool {
        !sequence_less_than(packet_index, self.first) && !sequence_greater_than(packet_index, self.last)
    }
}
