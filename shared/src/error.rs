use thiserror::Error;

use crate::{BunchSequence, ChannelIndex, SerdeErr};

/// How far the damage from a DecodeError reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DecodeSeverity {
    /// Drop the offending unit (and the rest of its packet), do not ack
    Unit,
    /// The channel is broken: all further traffic on it is discarded
    Channel,
    /// The connection must be closed
    Connection,
}

/// Structural problems found while decoding incoming bunches
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The bunch header or payload could not be read from the packet
    #[error("Malformed bunch in packet: {0}")]
    MalformedBunch(#[from] SerdeErr),

    /// The bunch addresses a channel index outside the channel table
    #[error("Bunch addressed channel index {index}, but only {max_channels} channels are allowed")]
    ChannelIndexOutOfRange {
        index: ChannelIndex,
        max_channels: u16,
    },

    /// A partial bunch that is not the last of its sequence ended mid-byte
    #[error("Non-final partial bunch on channel {index} has {bit_length} payload bits, which is not byte-aligned")]
    UnalignedPartialBunch {
        index: ChannelIndex,
        bit_length: u32,
    },

    /// A reliable partial assembly was abandoned before completion
    #[error("Reliable partial bunch assembly on channel {index} was abandoned at sequence {sequence}. Reliable partials must never be lost")]
    ReliablePartialAbandoned {
        index: ChannelIndex,
        sequence: BunchSequence,
    },

    /// An unreliable partial bunch arrived while a reliable assembly was in progress
    #[error("Unreliable partial bunch {sequence} on channel {index} interrupted a reliable assembly")]
    UnreliablePartialOverReliable {
        index: ChannelIndex,
        sequence: BunchSequence,
    },

    /// A reliable bunch is too far ahead of the expected sequence to be real
    #[error("Reliable sequence {sequence} on channel {index} is outside the receive window (expected after {expected})")]
    SequenceOutOfWindow {
        index: ChannelIndex,
        sequence: BunchSequence,
        expected: BunchSequence,
    },

    /// A reliable bunch was dispatched with a sequence at or behind one already dispatched
    #[error("Reliable sequence regressed on channel {index}: got {sequence}, already dispatched {dispatched}")]
    SequenceRegression {
        index: ChannelIndex,
        sequence: BunchSequence,
        dispatched: BunchSequence,
    },

    /// The remote opened a channel index reserved for this host
    #[error("Remote tried to open channel {index}, which is in this host's index range")]
    UnexpectedOpen { index: ChannelIndex },

    /// The remote closed a channel it does not own
    #[error("Remote tried to close channel {index}, which it did not open")]
    CloseFromNonOwner { index: ChannelIndex },

    /// A content block header or length could not be read
    #[error("Malformed content block on channel {index}: {reason}")]
    MalformedContentBlock {
        index: ChannelIndex,
        reason: &'static str,
    },

    /// The first bunch of an entity channel did not carry a readable open header
    #[error("Malformed entity open header on channel {index}")]
    MalformedEntityHeader { index: ChannelIndex },

    /// The entity of an entity channel could not be resolved or instantiated
    #[error("Entity {reference} on channel {index} could not be resolved or instantiated")]
    UnresolvableEntity {
        index: ChannelIndex,
        reference: u32,
    },

    /// A control channel message could not be read
    #[error("Malformed control message: {reason}")]
    MalformedControlMessage { reason: &'static str },
}

impl DecodeError {
    pub fn severity(&self) -> DecodeSeverity {
        match self {
            DecodeError::MalformedBunch(_) => DecodeSeverity::Unit,
            DecodeError::ChannelIndexOutOfRange { .. }
            | DecodeError::SequenceOutOfWindow { .. }
            | DecodeError::SequenceRegression { .. }
            | DecodeError::MalformedControlMessage { .. } => DecodeSeverity::Connection,
            DecodeError::UnalignedPartialBunch { .. }
            | DecodeError::ReliablePartialAbandoned { .. }
            | DecodeError::UnreliablePartialOverReliable { .. }
            | DecodeError::UnexpectedOpen { .. }
            | DecodeError::CloseFromNonOwner { .. }
            | DecodeError::MalformedContentBlock { .. }
            | DecodeError::MalformedEntityHeader { .. }
            | DecodeError::UnresolvableEntity { .. } => DecodeSeverity::Channel,
        }
    }
}

/// Conditions that always tear down the whole connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// The outgoing reliable list of a channel is full
    #[error("Reliable buffer overflow on channel {index}: {pending} bunches pending, capacity {capacity}")]
    ReliableBufferOverflow {
        index: ChannelIndex,
        pending: usize,
        capacity: usize,
    },

    /// Too many reliable bunches arrived ahead of the next expected sequence
    #[error("Out-of-order buffer overflow on channel {index}: capacity {capacity}")]
    OutOfOrderBufferOverflow {
        index: ChannelIndex,
        capacity: usize,
    },

    /// A reassembled partial bunch grew past the allowed size
    #[error("Assembled bunch on channel {index} would be {bytes} bytes, maximum is {max_bytes}")]
    AssembledBunchTooLarge {
        index: ChannelIndex,
        bytes: usize,
        max_bytes: usize,
    },

    /// The control channel's send queue is full
    #[error("Control channel queue overflow: {queued} messages queued, maximum is {max_queued}")]
    ControlQueueOverflow { queued: usize, max_queued: usize },

    /// A control message can never fit in a single bunch
    #[error("Control message of {bits} bits can never fit in a single bunch of {max_bits} bits")]
    ControlMessageOverflow { bits: u32, max_bits: u32 },

    /// A decode error whose severity reaches the whole connection
    #[error("Protocol violation: {0}")]
    Protocol(DecodeError),
}

/// Anything a channel can fail with while consuming incoming bunches
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Fatal(#[from] FatalError),
}
