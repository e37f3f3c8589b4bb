//! Split points: the shared record of a parallelized subtree.

use chess::ChessMove;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::movepick::MovePicker;
use crate::position::Position;
use crate::search::{Frame, SearchContext};
use crate::types::{Depth, Value};

/// State mutated by master and slaves together. The PV copy and the slave
/// bookkeeping must stay mutually consistent, so everything lives behind one
/// mutex rather than separate atomics.
pub struct SpShared {
    /// Move source consumed by every participant, strictly under the lock.
    pub picker: MovePicker,
    pub alpha: Value,
    pub best_value: Value,
    pub best_move: Option<ChessMove>,
    pub move_count: u32,
    /// Bitmask of enlisted workers still active at this split point.
    pub slaves: u32,
    /// Principal variation from the split ply, kept in sync with
    /// `best_move`.
    pub pv: SmallVec<[ChessMove; 32]>,
}

/// A parallelizable node. Immutable inputs are copied from the master when
/// the split is published; the parent link forms the (acyclic, depth-ordered)
/// chain that beta cutoffs propagate through.
pub struct SplitPoint {
    pub master: usize,
    pub parent: Option<Arc<SplitPoint>>,
    pub ctx: Arc<SearchContext>,

    pub pos: Position,
    pub ply: usize,
    pub depth: Depth,
    pub beta: Value,
    pub pv_node: bool,
    pub mate_threat: bool,
    /// Precomputed futility base for value pruning, `VALUE_NONE` at PV
    /// splits.
    pub futility_value: Value,
    /// Frames `ply-1 ..= ply+1` of the master's stack; slaves install them
    /// before searching so killers and threat moves carry over.
    pub stack_tail: [Frame; 3],

    /// A beta cutoff happened here; every participant must unwind.
    pub finished: AtomicBool,
    /// Nodes accumulated by participants of this split.
    pub nodes: AtomicU64,

    pub shared: Mutex<SpShared>,
}

impl SplitPoint {
    /// Workers still registered at this split point.
    pub fn slaves_mask(&self) -> u32 {
        self.shared.lock().unwrap().slaves
    }

    /// True if this split point or any ancestor saw a beta cutoff.
    pub fn chain_finished(self: &Arc<Self>) -> bool {
        let mut sp = Some(self.clone());
        while let Some(s) = sp {
            if s.finished.load(Ordering::Relaxed) {
                return true;
            }
            sp = s.parent.clone();
        }
        false
    }
}
