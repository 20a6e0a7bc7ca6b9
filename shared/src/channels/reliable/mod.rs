mod reliable_receiver;
mod reliable_sender;

pub use reliable_receiver::ReliableReceiver;
pub use reliable_sender::{OutgoingReliable, ReliableSender};
