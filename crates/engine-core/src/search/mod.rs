//! Search: iterative deepening driver, PV/zero-window alpha-beta and
//! quiescence, with cooperative split points for parallel subtree search.

mod helpers;
mod limits;
mod node;
mod root;
mod stack;
mod timeman;

pub use limits::LimitsType;
pub use root::SearchReport;
pub use stack::{new_stack, update_pv, Frame};
pub use timeman::{allocate, TimeAllocation};

pub(crate) use helpers::*;
pub(crate) use node::sp_search;

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::history::History;
use crate::position::Position;
use crate::threads::ThreadPool;
use crate::tt::TranspositionTable;
use crate::types::{Depth, Value, ONE_PLY, VALUE_MATE};

/// Sink for UCI `info` lines produced during the search.
pub type InfoSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Razoring is tried below this depth.
pub const RAZOR_DEPTH: Depth = 4 * ONE_PLY;
/// Futility value-pruning applies below this depth.
pub const SELECTIVE_DEPTH: Depth = 7 * ONE_PLY;
/// Margin for the null-move eval precondition and the razor margin base.
pub const NULL_MOVE_MARGIN: Value = 0x200;
/// Margin under which IID is allowed at non-PV nodes.
pub const IID_MARGIN: Value = 0x100;
/// Margin for the singular extension verification window.
pub const SINGLE_REPLY_MARGIN: Value = 0x20;
/// A root move this far above the rest is an "easy move".
pub const EASY_MOVE_MARGIN: Value = 0x200;
/// Root score drops beyond this margin flag a problem position.
pub const PROBLEM_MARGIN: Value = 0x28;

/// Immutable-per-search tunables, snapshotted from the option table when a
/// `go` command arrives. Extension values are in half-ply units, indexed by
/// `[pv_node as usize]`.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub threads: usize,
    pub multi_pv: usize,
    pub min_split_depth: Depth,
    pub max_threads_per_split_point: usize,
    pub use_sleeping_threads: bool,
    pub ponder_enabled: bool,

    pub check_extension: [Depth; 2],
    pub single_evasion_extension: [Depth; 2],
    pub mate_threat_extension: [Depth; 2],
    pub pawn_push_to_7th_extension: [Depth; 2],
    pub passed_pawn_extension: [Depth; 2],
    pub pawn_endgame_extension: [Depth; 2],
    pub threat_depth: Depth,

    pub futility_pruning_main: bool,
    pub futility_pruning_qs: bool,
    pub futility_margin_qs: Value,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            threads: 1,
            multi_pv: 1,
            min_split_depth: 4 * ONE_PLY,
            max_threads_per_split_point: 5,
            use_sleeping_threads: true,
            ponder_enabled: false,
            check_extension: [1, 2],
            single_evasion_extension: [2, 2],
            mate_threat_extension: [0, 0],
            pawn_push_to_7th_extension: [1, 1],
            passed_pawn_extension: [0, 1],
            pawn_endgame_extension: [2, 2],
            threat_depth: 5 * ONE_PLY,
            futility_pruning_main: true,
            futility_pruning_qs: true,
            futility_margin_qs: 0x80,
        }
    }
}

/// Cancellation and ponder flags shared by the UCI thread, the timer and
/// every worker.
#[derive(Default)]
pub struct Signals {
    /// Global abort: the whole search unwinds without trusting its values.
    pub abort: AtomicBool,
    /// Set instead of aborting while pondering; `ponderhit` converts it.
    pub stop_on_ponderhit: AtomicBool,
    /// True while thinking on the opponent's time.
    pub ponder: AtomicBool,
    /// Root failed low at the current aspiration window.
    pub failed_low_at_root: AtomicBool,
}

/// Reduction matrices for late-move reductions, precomputed once.
pub struct Reductions {
    pv: [[i8; 64]; 64],
    non_pv: [[i8; 64]; 64],
}

impl Reductions {
    pub fn new() -> Self {
        let mut pv = [[0i8; 64]; 64];
        let mut non_pv = [[0i8; 64]; 64];
        for depth in 1..64usize {
            for moves in 1..64usize {
                let pv_red = 0.5 + (depth as f64).ln() * (moves as f64).ln() / 6.0;
                let non_pv_red = 0.5 + (depth as f64).ln() * (moves as f64).ln() / 3.0;
                pv[depth][moves] = if pv_red >= 1.0 {
                    (pv_red * ONE_PLY as f64).floor() as i8
                } else {
                    0
                };
                non_pv[depth][moves] = if non_pv_red >= 1.0 {
                    (non_pv_red * ONE_PLY as f64).floor() as i8
                } else {
                    0
                };
            }
        }
        Reductions { pv, non_pv }
    }

    /// Reduction for a PV node at `depth` searching move number `moves`.
    #[inline]
    pub fn pv(&self, depth: Depth, moves: u32) -> Depth {
        let d = (depth / ONE_PLY).clamp(0, 63) as usize;
        let m = moves.min(63) as usize;
        self.pv[d][m] as Depth
    }

    #[inline]
    pub fn non_pv(&self, depth: Depth, moves: u32) -> Depth {
        let d = (depth / ONE_PLY).clamp(0, 63) as usize;
        let m = moves.min(63) as usize;
        self.non_pv[d][m] as Depth
    }
}

impl Default for Reductions {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-indexed futility margin, depth in half-ply units.
#[inline]
pub fn futility_margin(depth: Depth) -> Value {
    if depth < 2 {
        return 0;
    }
    let x = (depth * depth / 2) as u32;
    112 * (31 - x.leading_zeros()) as Value
}

/// Move-count threshold for late-move pruning.
#[inline]
pub fn futility_move_count(depth: Depth) -> u32 {
    3 + (1u32 << (3 * depth as u32 / 8))
}

/// Wall-clock state; `ponderhit` rebases the start so time accounting
/// resumes from that moment.
pub struct TimeState {
    start: Mutex<Instant>,
}

impl TimeState {
    fn new() -> Self {
        TimeState {
            start: Mutex::new(Instant::now()),
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        self.start.lock().unwrap().elapsed().as_millis() as i64
    }

    pub fn rebase(&self) {
        *self.start.lock().unwrap() = Instant::now();
    }
}

/// Shared state of one `go` command: everything the workers, the timer and
/// the UCI thread need to cooperate on a single search.
pub struct SearchContext {
    pub tt: Arc<TranspositionTable>,
    pub history: Arc<History>,
    pub config: SearchConfig,
    pub limits: LimitsType,
    pub signals: Signals,
    pub info: InfoSink,
    pub reductions: Reductions,
    pub time: TimeState,
    pub allocation: TimeAllocation,

    /// 1-based index of the root move currently being searched.
    pub root_move_number: AtomicUsize,
    /// Current iterative-deepening iteration.
    pub iteration: AtomicI32,
    /// Extra target time granted for best-move instability.
    pub extra_time: AtomicI64,
    /// Poll cadence on the main worker.
    pub nodes_between_polls: u64,
}

impl SearchContext {
    pub fn new(
        tt: Arc<TranspositionTable>,
        history: Arc<History>,
        config: SearchConfig,
        limits: LimitsType,
        pos: &Position,
        info: InfoSink,
    ) -> Arc<Self> {
        let allocation = allocate(&limits, pos.side_to_move(), config.ponder_enabled);

        let nodes_between_polls = if limits.nodes > 0 {
            limits.nodes.min(30_000)
        } else {
            let my_time = limits.time[pos.side_to_move() as usize];
            if my_time > 0 && my_time < 1000 {
                1_000
            } else if my_time > 0 && my_time < 5000 {
                5_000
            } else {
                30_000
            }
        };

        let signals = Signals {
            ponder: AtomicBool::new(limits.ponder),
            ..Default::default()
        };

        Arc::new(SearchContext {
            tt,
            history,
            config,
            limits,
            signals,
            info,
            reductions: Reductions::new(),
            time: TimeState::new(),
            allocation,
            root_move_number: AtomicUsize::new(0),
            iteration: AtomicI32::new(0),
            extra_time: AtomicI64::new(0),
            nodes_between_polls,
        })
    }

    #[inline]
    pub fn aborted(&self) -> bool {
        self.signals.abort.load(Ordering::Relaxed)
    }

    /// Timer / poll decision: is the clock or node budget exhausted?
    /// Never stops a pondering search.
    pub fn check_stop_conditions(&self, nodes: u64) {
        if self.signals.ponder.load(Ordering::Relaxed) {
            return;
        }

        let t = self.time.elapsed_ms();
        let iteration = self.iteration.load(Ordering::Relaxed);

        let still_at_first_move = self.root_move_number.load(Ordering::Relaxed) <= 1
            && !self.signals.failed_low_at_root.load(Ordering::Relaxed)
            && t > self.allocation.optimum + self.extra_time.load(Ordering::Relaxed);

        let no_more_time = t > self.allocation.maximum || still_at_first_move;

        if (iteration >= 3 && self.limits.use_time_management() && no_more_time)
            || (self.limits.movetime > 0 && t >= self.limits.movetime)
            || (iteration >= 3 && self.limits.nodes > 0 && nodes >= self.limits.nodes)
        {
            self.signals.abort.store(true, Ordering::SeqCst);
        }
    }
}

/// Format a score for an `info` line: `cp N` or `mate N`.
pub fn uci_score(v: Value) -> String {
    if v.abs() >= VALUE_MATE - crate::types::PLY_MAX as Value {
        let moves = if v > 0 {
            (VALUE_MATE - v + 1) / 2
        } else {
            -(VALUE_MATE + v) / 2
        };
        format!("mate {moves}")
    } else {
        format!("cp {v}")
    }
}

/// Run a complete search for the current `go` command on the calling thread,
/// which acts as the main worker. Returns after the iterative deepening
/// loop exits; the caller emits `bestmove`.
pub fn think(
    pool: &Arc<ThreadPool>,
    ctx: &Arc<SearchContext>,
    pos: &mut Position,
) -> SearchReport {
    pool.prepare_search(ctx);

    let mut locals = pool.take_main_locals();
    let report = root::id_loop(
        node::SearchEnv { ctx, pool },
        &mut locals,
        pos,
    );
    pool.return_main_locals(locals);

    pool.finish_search();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reductions_grow_with_depth_and_move_number() {
        let r = Reductions::new();
        assert_eq!(r.pv(2 * ONE_PLY, 2), 0);
        assert!(r.non_pv(10 * ONE_PLY, 30) >= r.non_pv(10 * ONE_PLY, 5));
        assert!(r.non_pv(20 * ONE_PLY, 20) >= r.pv(20 * ONE_PLY, 20));
        // Reductions are whole half-ply counts and bounded by the depth.
        for d in 1..30 {
            for m in 1..60 {
                assert!(r.non_pv(d * ONE_PLY, m) >= 0);
            }
        }
    }

    #[test]
    fn futility_margin_is_monotone() {
        let mut last = 0;
        for d in 2..16 {
            let m = futility_margin(d);
            assert!(m >= last);
            last = m;
        }
    }

    #[test]
    fn futility_move_count_matches_reference_shape() {
        assert_eq!(futility_move_count(2), 3 + 1);
        assert_eq!(futility_move_count(8), 3 + 8);
    }

    #[test]
    fn uci_score_formats_mate() {
        assert_eq!(uci_score(100), "cp 100");
        assert_eq!(uci_score(VALUE_MATE - 1), "mate 1");
        assert_eq!(uci_score(VALUE_MATE - 3), "mate 2");
        assert_eq!(uci_score(-(VALUE_MATE - 2)), "mate -1");
    }
}
