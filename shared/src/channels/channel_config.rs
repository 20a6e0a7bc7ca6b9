use std::time::Duration;

/// Limits shared by every channel on a connection
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Largest payload, in bytes, a single bunch may carry before it is split
    /// into partial bunches
    pub max_bunch_bytes: usize,
    /// A split producing at least this many partials is forced to be reliable.
    /// `None` never upgrades.
    pub partial_reliable_threshold: Option<usize>,
    /// Largest payload, in bytes, partial reassembly may produce
    pub max_assembled_bytes: usize,
    /// Maximum count of unacknowledged reliable bunches per channel
    pub reliable_buffer: usize,
    /// Maximum count of reliable bunches buffered ahead of a gap
    pub out_of_order_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_bunch_bytes: 960,
            partial_reliable_threshold: Some(8),
            max_assembled_bytes: 64 * 1024,
            reliable_buffer: 256,
            out_of_order_buffer: 256,
        }
    }
}

impl ChannelConfig {
    pub fn max_bunch_bits(&self) -> u32 {
        (self.max_bunch_bytes as u32).saturating_mul(8)
    }
}

/// Tuning for the control channel's send queue
#[derive(Clone, Debug)]
pub struct ControlChannelConfig {
    /// Queued messages beyond this count close the connection
    pub max_queued_messages: usize,
    /// Before the control channel's open is acknowledged, unacked bunches
    /// older than this are sent again
    pub resend_timeout: Duration,
    /// Pre-open resends stop while more than this many bunches are unacked
    pub max_unacked_for_resend: usize,
}

impl Default for ControlChannelConfig {
    fn default() -> Self {
        Self {
            max_queued_messages: 1024,
            resend_timeout: Duration::from_secs(1),
            max_unacked_for_resend: 8,
        }
    }
}

/// Tuning for entity channels
#[derive(Clone, Debug)]
pub struct EntityChannelConfig {
    /// Minimum quiet time after the last update before a dormant channel may close
    pub dormancy_hysteresis: Duration,
    /// Queued bunches each tick may replay, across all entity channels
    pub queued_bunch_budget: usize,
    /// A bunch queued longer than this is reported once as a slow resolution
    pub queued_bunch_warn_after: Duration,
}

impl Default for EntityChannelConfig {
    fn default() -> Self {
        Self {
            dormancy_hysteresis: Duration::from_millis(500),
            queued_bunch_budget: 64,
            queued_bunch_warn_after: Duration::from_secs(1),
        }
    }
}
