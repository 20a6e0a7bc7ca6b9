mod partial_bunch_assembler;
mod partial_bunch_splitter;

pub use partial_bunch_assembler::{AssemblyOutcome, PartialBunchAssembler};
pub use partial_bunch_splitter::{split_bunch, SplitBunch};
