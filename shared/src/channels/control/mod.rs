mod control_channel;
mod control_message;

pub use control_channel::ControlChannel;
pub use control_message::ControlMessage;
