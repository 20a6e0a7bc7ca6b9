use thiserror::Error;

/// Returned when a bit stream cannot be read as the requested type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Failed to deserialize value from bit stream. The stream is truncated or malformed")]
pub struct SerdeErr;
