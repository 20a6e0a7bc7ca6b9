mod bunch;
mod close_reason;
mod payload;

pub use bunch::{Bunch, PartialFlags};
pub use close_reason::CloseReason;
pub use payload::Payload;
