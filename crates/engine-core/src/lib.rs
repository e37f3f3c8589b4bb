//! Parallel alpha-beta chess search core.
//!
//! The crate is organized around a shared [`tt::TranspositionTable`], a staged
//! [`movepick::MovePicker`], per-worker evaluation caches and a worker pool
//! that cooperatively splits the search tree at split points.

pub mod eval;
pub mod history;
pub mod movepick;
pub mod position;
pub mod search;
pub mod threads;
pub mod tt;
pub mod types;

pub use position::Position;
pub use search::{LimitsType, SearchReport};
pub use threads::ThreadPool;
pub use tt::TranspositionTable;
pub use types::{Depth, Value};
