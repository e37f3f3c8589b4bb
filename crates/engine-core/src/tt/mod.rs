//! Shared transposition table.
//!
//! Entries are 128 bits split over two atomic words, with the key XOR-ed
//! against the data word so torn reads fail the key test instead of
//! producing a plausible-but-wrong hit.

mod entry;
mod table;

pub use entry::TTData;
pub use table::TranspositionTable;

/// Co-located entries probed per key.
pub const CLUSTER_SIZE: usize = 4;

/// Default table size in megabytes.
pub const TT_DEFAULT_MB: usize = 32;
