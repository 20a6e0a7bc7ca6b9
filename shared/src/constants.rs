use crate::ChannelIndex;

/// The reserved index of the control channel
pub const CONTROL_CHANNEL_INDEX: ChannelIndex = 0;

/// Bits spent on a packet's per-bunch "continue" flag and final terminator
pub const PACKET_FRAMING_BITS: u32 = 1;

/// Upper bound on a bunch header, used to reserve room when sizing packets
pub const MAX_BUNCH_HEADER_BITS: u32 = 128;
