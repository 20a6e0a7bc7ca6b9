//! # Skein Shared
//! Channel multiplexing over a single packet connection: bunches, partial
//! bunch splitting and reassembly, reliable sequencing, and the control and
//! entity channel kinds built on top of them.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use skein_serde::{
    BitReader, BitWrite, BitWriter, Serde, SerdeErr, UnsignedInteger, UnsignedVariableInteger,
};

pub mod bunch;
pub mod channels;
pub mod connection;
mod constants;
mod error;
mod reference;
mod sequence_list;
mod types;
mod wrapping_number;

pub use bunch::{Bunch, CloseReason, PartialFlags, Payload};
pub use channels::{
    channel::{BunchSink, Channel, ChannelRole, OpenState},
    channel_config::{ChannelConfig, ControlChannelConfig, EntityChannelConfig},
    channel_id::ChannelId,
    channel_kind::{ChannelCapabilities, ChannelKind},
    control::ControlMessage,
    entity::{ContentBlockWriter, DormancyState, ReplicationEvent},
};
pub use connection::{
    connection::{Connection, PacketReceipt},
    connection_config::{ConfigError, ConnectionConfig},
    error::{ConnectionError, SendError},
    events::{ConnectionEvent, DisconnectReason},
    packet_id_range::PacketIdRange,
    packet_transport::PacketTransport,
};
pub use constants::{CONTROL_CHANNEL_INDEX, MAX_BUNCH_HEADER_BITS, PACKET_FRAMING_BITS};
pub use error::{ChannelError, DecodeError, DecodeSeverity, FatalError};
pub use reference::{NetRefId, ObjectHandle, ReferenceCache};
pub use sequence_list::{SequenceError, SequenceList};
pub use types::{BunchSequence, ChannelIndex, HostType, PacketIndex};
pub use wrapping_number::{sequence_distance, sequence_greater_than, sequence_less_than};
