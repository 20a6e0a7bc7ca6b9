use thiserror::Error;

use crate::{ChannelIndex, ChannelKind, FatalError};

/// Misuse of the local sending API. These never close the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The channel id does not name a live channel (it may have been released)
    #[error("Channel {index} (generation {generation}) does not exist or has been released")]
    UnknownChannel { index: ChannelIndex, generation: u32 },

    /// Every channel index this host may open is in use
    #[error("No free channel index left among {max_channels} channels")]
    NoFreeChannelIndex { max_channels: u16 },

    /// The remote has not finished opening this channel yet
    #[error("Channel {index} is not open yet. Wait for the remote open to complete before sending")]
    ChannelNotOpen { index: ChannelIndex },

    /// A close has already been sent on this channel
    #[error("Channel {index} is closing, no further bunches may be sent")]
    ChannelClosing { index: ChannelIndex },

    /// The index is reserved, out of range, or held by a channel that cannot be shared
    #[error("Channel index {index} is not available for a shared open")]
    ChannelIndexUnavailable { index: ChannelIndex },

    /// A decode error broke the channel
    #[error("Channel {index} is broken and can no longer be used")]
    ChannelBroken { index: ChannelIndex },

    /// Only the end that opened the channel may close it
    #[error("Channel {index} was opened by the remote end and its kind cannot be closed from this side")]
    NotChannelOwner { index: ChannelIndex },

    /// The operation needs a different kind of channel
    #[error("Channel {index} does not support this operation")]
    WrongChannelKind { index: ChannelIndex },

    /// Channels of this kind cannot be opened through this call
    #[error("{kind:?} channels cannot be opened this way")]
    UnsupportedKind { kind: ChannelKind },

    /// An entity channel needs non-null entity and type references
    #[error("Entity channels need a non-null entity reference and type reference")]
    EntityNotBound,

    /// A single bunch does not fit into an empty packet
    #[error("Bunch of {bits} bits does not fit in a packet of {max_bits} bits. Lower max_bunch_bytes")]
    BunchTooLarge { bits: u32, max_bits: u32 },
}

/// Errors surfaced by Connection methods
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The connection was disconnected or failed earlier
    #[error("Connection is closed")]
    Closed,

    #[error(transparent)]
    Send(#[from] SendError),

    /// The connection was torn down because of this error
    #[error("Connection closed: {0}")]
    Fatal(#[from] FatalError),
}
