mod net_ref;
mod reference_cache;

pub use net_ref::{NetRefId, ObjectHandle};
pub use reference_cache::ReferenceCache;
