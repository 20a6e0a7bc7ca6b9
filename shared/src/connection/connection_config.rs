use std::default::Default;

use thiserror::Error;

use crate::{
    constants::MAX_BUNCH_HEADER_BITS, ChannelConfig, ControlChannelConfig, EntityChannelConfig,
};

/// Problems with a ConnectionConfig that would make the connection unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A bunch at its maximum size plus its header must fit in one packet
    #[error("max_bunch_bytes ({max_bunch_bytes}) plus header does not fit in max_packet_bytes ({max_packet_bytes})")]
    BunchLargerThanPacket {
        max_bunch_bytes: usize,
        max_packet_bytes: usize,
    },

    /// A field that must be non-zero is zero
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    /// The channel table needs room for the control channel and one more
    #[error("max_channels must be at least 2, got {max_channels}")]
    TooFewChannels { max_channels: u16 },

    /// Reliable windows must stay well inside half the sequence space
    #[error("{field} ({value}) must be less than 16384 so wrapping sequence comparison stays unambiguous")]
    WindowTooLarge { field: &'static str, value: usize },
}

/// Contains Config properties which will be used by a Connection
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Largest packet, in bytes, handed to the transport
    pub max_packet_bytes: usize,
    /// Size of the channel table. Index 0 is always the control channel.
    pub max_channels: u16,
    /// Limits shared by every channel
    pub channel: ChannelConfig,
    /// Control channel queueing and pre-open resend
    pub control: ControlChannelConfig,
    /// Entity channel dormancy and queued bunch draining
    pub entity: EntityChannelConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_packet_bytes: 1024,
            max_channels: 2048,
            channel: ChannelConfig::default(),
            control: ControlChannelConfig::default(),
            entity: EntityChannelConfig::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_packet_bytes == 0 {
            return Err(ConfigError::ZeroValue {
                field: "max_packet_bytes",
            });
        }
        if self.channel.max_bunch_bytes == 0 {
            return Err(ConfigError::ZeroValue {
                field: "channel.max_bunch_bytes",
            });
        }
        if self.channel.reliable_buffer < 2 {
            return Err(ConfigError::ZeroValue {
                field: "channel.reliable_buffer",
            });
        }
        if self.entity.queued_bunch_budget == 0 {
            return Err(ConfigError::ZeroValue {
                field: "entity.queued_bunch_budget",
            });
        }
        if self.max_channels < 2 {
            return Err(ConfigError::TooFewChannels {
                max_channels: self.max_channels,
            });
        }

        let header_bytes = MAX_BUNCH_HEADER_BITS.div_ceil(8) as usize;
        if self.channel.max_bunch_bytes + header_bytes > self.max_packet_bytes {
            return Err(ConfigError::BunchLargerThanPacket {
                max_bunch_bytes: self.channel.max_bunch_bytes,
                max_packet_bytes: self.max_packet_bytes,
            });
        }

        for (field, value) in [
            ("channel.reliable_buffer", self.channel.reliable_buffer),
            ("channel.out_of_order_buffer", self.channel.out_of_order_buffer),
        ] {
            if value >= 16384 {
                return Err(ConfigError::WindowTooLarge { field, value });
            }
        }

        Ok(())
    }
}
