use crate::ChannelIndex;

/// A handle to one generation of a channel slot. Once the slot is released
/// and reused, old handles stop resolving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId {
    pub index: ChannelIndex,
    pub generation: u32,
}

impl ChannelId {
    pub fn new(index: ChannelIndex, generation: u32) -> Self {
        Self { index, generation }
    }
}
