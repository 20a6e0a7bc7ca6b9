mod content_block;
mod content_block_writer;
mod dormancy;
mod entity_channel;
mod queued_bunches;
mod replication_cursor;
mod replication_event;

pub use content_block::ContentBlockHeader;
pub use content_block_writer::ContentBlockWriter;
pub use dormancy::{Dormancy, DormancyState};
pub use entity_channel::EntityChannel;
pub(crate) use entity_channel::DrainStatus;
pub use queued_bunches::{QueuedBunch, QueuedBunches};
pub use replication_cursor::ReplicationCursor;
pub use replication_event::ReplicationEvent;
