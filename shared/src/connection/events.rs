use crate::{
    bunch::{CloseReason, Payload},
    channels::{control::ControlMessage, entity::ReplicationEvent},
    ChannelId, ChannelKind, DecodeError, FatalError,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called
    Local,
    /// The remote closed the control channel
    RemoteClosed,
    Fatal(FatalError),
}

/// Everything a Connection reports to the application, drained with
/// `Connection::take_events`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The remote end opened a channel
    ChannelOpened {
        channel: ChannelId,
        kind: ChannelKind,
    },
    /// The remote end closed a channel and its close has been processed
    ChannelClosed {
        channel: ChannelId,
        reason: CloseReason,
    },
    /// The channel's slot was reclaimed
    ChannelReleased { channel: ChannelId },
    /// A decode error broke the channel; its further traffic is discarded
    ChannelBroken {
        channel: ChannelId,
        error: DecodeError,
    },
    /// A complete bunch arrived on a voice or data channel
    Bunch {
        channel: ChannelId,
        payload: Payload,
    },
    ControlMessage(ControlMessage),
    Replication(ReplicationEvent),
    Disconnected { reason: DisconnectReason },
}
