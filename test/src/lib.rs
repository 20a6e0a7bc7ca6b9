pub mod helpers;
pub mod local_transport;
pub mod test_references;

pub use helpers::*;
pub use local_transport::LocalTransport;
pub use test_references::TestReferenceCache;
