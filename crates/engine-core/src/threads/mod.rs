//! Worker pool: a fixed set of helper threads that idle on condition
//! variables and execute split-point subsearches, plus a timer thread that
//! raises time-based stop conditions.
//!
//! Locking order is enlistment lock first, then split-point mutexes; worker
//! state and `current_split` mutexes are leaves. A split-point mutex is
//! never held while acquiring another split-point mutex.

mod splitpoint;

pub use splitpoint::{SpShared, SplitPoint};

use chess::ChessMove;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::eval::EvalCaches;
use crate::movepick::MovePicker;
use crate::position::Position;
use crate::search::{new_stack, Frame, SearchContext};
use crate::types::{Depth, Value, PLY_MAX_PLUS_2};

pub const MAX_THREADS: usize = 32;
pub const MAX_SPLITPOINTS_PER_THREAD: usize = 8;

/// How often the timer thread re-checks the clock while a search is armed.
const TIMER_RESOLUTION_MS: u64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Initializing,
    Searching,
    Available,
    Booked,
    WorkIsWaiting,
    Terminated,
}

/// Shared per-worker handle. The thread's mutable search state (stack,
/// evaluation caches) lives in [`WorkerLocals`], owned by the OS thread.
pub struct Worker {
    pub state: Mutex<WorkerState>,
    pub cond: Condvar,
    /// Direct stop request for this worker, set on beta cutoffs above it.
    pub stop: AtomicBool,
    pub nodes: AtomicU64,
    /// Beta cutoff counters per side, weighted by depth; root-sort tiebreak.
    pub beta_cutoffs: [AtomicU64; 2],
    pub active_split_points: AtomicUsize,
    /// Bounded stack of split points this worker is master of.
    pub split_stack: Mutex<Vec<Arc<SplitPoint>>>,
    /// Split point this worker currently works under, if any.
    pub current_split: Mutex<Option<Arc<SplitPoint>>>,
}

impl Worker {
    fn new() -> Self {
        Worker {
            state: Mutex::new(WorkerState::Initializing),
            cond: Condvar::new(),
            stop: AtomicBool::new(false),
            nodes: AtomicU64::new(0),
            beta_cutoffs: [AtomicU64::new(0), AtomicU64::new(0)],
            active_split_points: AtomicUsize::new(0),
            split_stack: Mutex::new(Vec::with_capacity(MAX_SPLITPOINTS_PER_THREAD)),
            current_split: Mutex::new(None),
        }
    }

    pub fn wake_up(&self) {
        let _guard = self.state.lock().unwrap();
        self.cond.notify_one();
    }
}

/// Thread-owned search scratch: stack frames and evaluation caches. Handing
/// these out by value keeps the hot search path free of locks.
pub struct WorkerLocals {
    pub id: usize,
    pub caches: EvalCaches,
    pub ss: Vec<Frame>,
    pub nodes_since_poll: u64,
    pub last_info_ms: i64,
}

impl WorkerLocals {
    pub fn new(id: usize) -> Self {
        WorkerLocals {
            id,
            caches: EvalCaches::default(),
            ss: new_stack(PLY_MAX_PLUS_2 + 2),
            nodes_since_poll: 0,
            last_info_ms: 0,
        }
    }
}

/// Result of a joined split point, merged back into the master's node.
pub struct SplitOutcome {
    pub alpha: Value,
    pub best_value: Value,
    pub best_move: Option<ChessMove>,
    pub move_count: u32,
    pub pv: SmallVec<[ChessMove; 32]>,
}

struct TimerControl {
    armed: Mutex<Option<Arc<SearchContext>>>,
    cond: Condvar,
}

/// The pool proper. Worker handles for all `MAX_THREADS` slots exist up
/// front; OS threads are spawned lazily up to the configured thread count.
pub struct ThreadPool {
    workers: Vec<Arc<Worker>>,
    /// Global enlistment lock; every split books its slaves under it.
    enlist: Mutex<()>,
    active_threads: AtomicUsize,
    use_sleeping_threads: AtomicBool,
    exit: AtomicBool,
    spawned: Mutex<Vec<JoinHandle<()>>>,
    timer: TimerControl,
    main_locals: Mutex<Option<WorkerLocals>>,
}

impl ThreadPool {
    pub fn new() -> Arc<Self> {
        let pool = Arc::new(ThreadPool {
            workers: (0..MAX_THREADS).map(|_| Arc::new(Worker::new())).collect(),
            enlist: Mutex::new(()),
            active_threads: AtomicUsize::new(1),
            use_sleeping_threads: AtomicBool::new(true),
            exit: AtomicBool::new(false),
            spawned: Mutex::new(Vec::new()),
            timer: TimerControl {
                armed: Mutex::new(None),
                cond: Condvar::new(),
            },
            main_locals: Mutex::new(Some(WorkerLocals::new(0))),
        });

        // The main worker (slot 0) is driven by whichever thread calls
        // `think`; mark it searching so it is never booked as a slave.
        *pool.workers[0].state.lock().unwrap() = WorkerState::Searching;

        let timer_pool = pool.clone();
        let handle = std::thread::Builder::new()
            .name("timer".into())
            .spawn(move || timer_loop(timer_pool))
            .expect("failed to spawn timer thread");
        pool.spawned.lock().unwrap().push(handle);

        pool
    }

    #[inline]
    pub fn worker(&self, id: usize) -> &Arc<Worker> {
        &self.workers[id]
    }

    #[inline]
    pub fn active_threads(&self) -> usize {
        self.active_threads.load(Ordering::Relaxed)
    }

    pub fn set_use_sleeping_threads(&self, value: bool) {
        self.use_sleeping_threads.store(value, Ordering::Relaxed);
    }

    /// Resize the active worker set, spawning helper threads on demand.
    /// Fatal on spawn failure: a pool that cannot grow is misconfigured.
    pub fn set_active_threads(self: &Arc<Self>, count: usize) {
        let count = count.clamp(1, MAX_THREADS);
        let mut spawned = self.spawned.lock().unwrap();
        // Slot 0 is the caller, one handle is the timer.
        let helpers_running = spawned.len() - 1;

        for id in helpers_running + 1..count {
            let pool = self.clone();
            let handle = std::thread::Builder::new()
                .name(format!("worker-{id}"))
                .stack_size(8 * 1024 * 1024)
                .spawn(move || {
                    let mut locals = WorkerLocals::new(id);
                    idle_loop(pool, &mut locals);
                })
                .unwrap_or_else(|e| {
                    log::error!("failed to create worker thread {id}: {e}");
                    std::process::exit(1);
                });
            spawned.push(handle);
        }
        self.active_threads.store(count, Ordering::Relaxed);
    }

    /// Sum of node counters over the active workers.
    pub fn nodes_searched(&self) -> u64 {
        self.workers
            .iter()
            .take(self.active_threads())
            .map(|w| w.nodes.load(Ordering::Relaxed))
            .sum()
    }

    pub fn clear_beta_counters(&self) {
        for w in &self.workers {
            w.beta_cutoffs[0].store(0, Ordering::Relaxed);
            w.beta_cutoffs[1].store(0, Ordering::Relaxed);
        }
    }

    /// Depth-weighted beta cutoff totals for `us` and the opponent.
    pub fn read_beta_counters(&self, us: chess::Color) -> (u64, u64) {
        let mut ours = 0;
        let mut theirs = 0;
        for w in &self.workers {
            ours += w.beta_cutoffs[us as usize].load(Ordering::Relaxed);
            theirs += w.beta_cutoffs[(!us) as usize].load(Ordering::Relaxed);
        }
        (ours, theirs)
    }

    /// Has `worker` been asked to stop, directly or through a finished
    /// ancestor split point? Monotonic within one search.
    pub fn thread_should_stop(&self, worker: usize) -> bool {
        let w = &self.workers[worker];
        if w.stop.load(Ordering::Relaxed) {
            return true;
        }
        if self.active_threads() <= 2 {
            // With at most one slave, cutoffs always set `stop` directly.
            return false;
        }
        let sp = w.current_split.lock().unwrap().clone();
        if let Some(sp) = sp {
            if sp.chain_finished() {
                w.stop.store(true, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    /// Helpful-master availability rule: `slave` must be idle, and if it
    /// has active split points of its own, `master` must already be helping
    /// at the top one.
    fn thread_is_available(&self, slave: usize, master: usize) -> bool {
        if slave == master {
            return false;
        }
        let w = &self.workers[slave];
        if *w.state.lock().unwrap() != WorkerState::Available {
            return false;
        }

        let split_points = w.active_split_points.load(Ordering::Relaxed);
        if split_points == 0 || self.active_threads() == 2 {
            return true;
        }

        let stack = w.split_stack.lock().unwrap();
        stack
            .last()
            .map(|sp| sp.slaves_mask() & (1 << master) != 0)
            .unwrap_or(true)
    }

    pub fn idle_worker_exists(&self, master: usize) -> bool {
        (0..self.active_threads()).any(|i| self.thread_is_available(i, master))
    }

    /// Arm the timer and reset per-search worker state.
    pub fn prepare_search(&self, ctx: &Arc<SearchContext>) {
        *self.workers[0].state.lock().unwrap() = WorkerState::Searching;
        for w in self.workers.iter() {
            w.stop.store(false, Ordering::Relaxed);
            w.nodes.store(0, Ordering::Relaxed);
            w.beta_cutoffs[0].store(0, Ordering::Relaxed);
            w.beta_cutoffs[1].store(0, Ordering::Relaxed);
            w.active_split_points.store(0, Ordering::Relaxed);
            w.split_stack.lock().unwrap().clear();
            *w.current_split.lock().unwrap() = None;
        }
        self.set_use_sleeping_threads(ctx.config.use_sleeping_threads);

        *self.timer.armed.lock().unwrap() = Some(ctx.clone());
        self.timer.cond.notify_one();

        // Kick sleeping helpers so they are ready to be booked.
        for w in self.workers.iter().take(self.active_threads()).skip(1) {
            w.wake_up();
        }
    }

    pub fn finish_search(&self) {
        *self.timer.armed.lock().unwrap() = None;
        self.timer.cond.notify_one();
    }

    pub fn take_main_locals(&self) -> WorkerLocals {
        self.main_locals
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| WorkerLocals::new(0))
    }

    pub fn return_main_locals(&self, locals: WorkerLocals) {
        *self.main_locals.lock().unwrap() = Some(locals);
    }

    /// Terminate helpers and the timer. Called once at process exit.
    pub fn shutdown(&self) {
        self.exit.store(true, Ordering::SeqCst);
        for w in self.workers.iter() {
            w.stop.store(true, Ordering::Relaxed);
            w.wake_up();
        }
        self.timer.cond.notify_one();
        let handles = std::mem::take(&mut *self.spawned.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
    }

    #[inline]
    pub fn should_exit(&self) -> bool {
        self.exit.load(Ordering::Relaxed)
    }
}

/// Helper-thread main loop: sleep until booked, run the assigned split
/// point, go idle again.
fn idle_loop(pool: Arc<ThreadPool>, locals: &mut WorkerLocals) {
    let me = pool.workers[locals.id].clone();
    *me.state.lock().unwrap() = WorkerState::Available;

    loop {
        {
            let mut state = me.state.lock().unwrap();
            loop {
                if pool.should_exit() {
                    *state = WorkerState::Terminated;
                    return;
                }
                if *state == WorkerState::WorkIsWaiting {
                    *state = WorkerState::Searching;
                    break;
                }
                if pool.use_sleeping_threads.load(Ordering::Relaxed) {
                    state = me.cond.wait(state).unwrap();
                } else {
                    drop(state);
                    std::thread::yield_now();
                    state = me.state.lock().unwrap();
                }
            }
        }

        let sp = me.current_split.lock().unwrap().clone();
        if let Some(sp) = sp {
            crate::search::sp_search(&sp, &pool, locals);
        }

        let mut state = me.state.lock().unwrap();
        if *state == WorkerState::Searching {
            *state = WorkerState::Available;
        }
    }
}

/// Publish a split point for the node the master is searching, enlist idle
/// workers, participate, and join when every slave has detached.
///
/// On refusal the move picker is handed back so the serial loop continues.
#[allow(clippy::too_many_arguments)]
pub fn split<const PV: bool>(
    pool: &Arc<ThreadPool>,
    ctx: &Arc<SearchContext>,
    locals: &mut WorkerLocals,
    pos: &Position,
    ply: usize,
    alpha: Value,
    beta: Value,
    best_value: Value,
    futility_value: Value,
    depth: Depth,
    move_count: u32,
    mate_threat: bool,
    picker: MovePicker,
) -> Result<SplitOutcome, MovePicker> {
    let master_id = locals.id;

    let guard = pool.enlist.lock().unwrap();
    let master = &pool.workers[master_id];

    if !pool.idle_worker_exists(master_id)
        || master.active_split_points.load(Ordering::Relaxed) >= MAX_SPLITPOINTS_PER_THREAD
    {
        drop(guard);
        return Err(picker);
    }

    let parent = master.current_split.lock().unwrap().clone();
    let stack_tail = [
        locals.ss[ply - 1].clone(),
        locals.ss[ply].clone(),
        locals.ss[ply + 1].clone(),
    ];

    let sp = Arc::new(SplitPoint {
        master: master_id,
        parent,
        ctx: ctx.clone(),
        pos: pos.clone(),
        ply,
        depth,
        beta,
        pv_node: PV,
        mate_threat,
        futility_value,
        stack_tail,
        finished: AtomicBool::new(false),
        nodes: AtomicU64::new(0),
        shared: Mutex::new(SpShared {
            picker,
            alpha: if PV { alpha } else { beta - 1 },
            best_value,
            best_move: None,
            move_count,
            slaves: 0,
            pv: SmallVec::new(),
        }),
    });

    master.split_stack.lock().unwrap().push(sp.clone());
    master.active_split_points.fetch_add(1, Ordering::Relaxed);
    *master.current_split.lock().unwrap() = Some(sp.clone());
    master.stop.store(false, Ordering::Relaxed);

    let mut booked = Vec::with_capacity(ctx.config.max_threads_per_split_point);
    for i in 0..pool.active_threads() {
        if booked.len() + 1 >= ctx.config.max_threads_per_split_point {
            break;
        }
        if pool.thread_is_available(i, master_id) {
            let w = &pool.workers[i];
            w.stop.store(false, Ordering::Relaxed);
            *w.current_split.lock().unwrap() = Some(sp.clone());
            sp.shared.lock().unwrap().slaves |= 1 << i;
            *w.state.lock().unwrap() = WorkerState::Booked;
            booked.push(i);
        }
    }
    drop(guard);

    // Booked slaves start only now, with the split point fully published.
    for &i in &booked {
        let w = &pool.workers[i];
        let mut state = w.state.lock().unwrap();
        *state = WorkerState::WorkIsWaiting;
        w.cond.notify_one();
    }

    // The master works its own split point like any slave.
    crate::search::sp_search(&sp, pool, locals);

    // Wait until every slave detached; while parked the master stays
    // available so its own slaves can book it deeper (helpful master).
    {
        let me = &pool.workers[master_id];
        let mut state = me.state.lock().unwrap();
        *state = WorkerState::Available;
        loop {
            if *state == WorkerState::WorkIsWaiting {
                *state = WorkerState::Searching;
                drop(state);

                let child = me.current_split.lock().unwrap().clone();
                if let Some(child) = child {
                    if !Arc::ptr_eq(&child, &sp) {
                        crate::search::sp_search(&child, pool, locals);
                    }
                }
                *me.current_split.lock().unwrap() = Some(sp.clone());

                state = me.state.lock().unwrap();
                *state = WorkerState::Available;
                continue;
            }
            if sp.slaves_mask() == 0 {
                break;
            }
            state = me.cond.wait(state).unwrap();
        }
        *state = WorkerState::Searching;
    }

    // Join: read the result and pop the split point.
    let guard = pool.enlist.lock().unwrap();
    let outcome = {
        let shared = sp.shared.lock().unwrap();
        SplitOutcome {
            alpha: shared.alpha,
            best_value: shared.best_value,
            best_move: shared.best_move,
            move_count: shared.move_count,
            pv: shared.pv.clone(),
        }
    };
    master.stop.store(false, Ordering::Relaxed);
    master.split_stack.lock().unwrap().pop();
    master.active_split_points.fetch_sub(1, Ordering::Relaxed);
    *master.current_split.lock().unwrap() = sp.parent.clone();
    drop(guard);

    Ok(outcome)
}

/// Timer thread: park while idle, tick while a search is armed.
fn timer_loop(pool: Arc<ThreadPool>) {
    let mut slot = pool.timer.armed.lock().unwrap();
    loop {
        if pool.should_exit() {
            return;
        }
        if slot.is_some() {
            let (s, _timeout) = pool
                .timer
                .cond
                .wait_timeout(slot, Duration::from_millis(TIMER_RESOLUTION_MS))
                .unwrap();
            slot = s;
            if let Some(ctx) = slot.as_ref() {
                ctx.check_stop_conditions(pool.nodes_searched());
            }
        } else {
            slot = pool.timer.cond.wait(slot).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_starts_with_one_active_thread() {
        let pool = ThreadPool::new();
        assert_eq!(pool.active_threads(), 1);
        assert_eq!(pool.nodes_searched(), 0);
        pool.shutdown();
    }

    #[test]
    fn set_active_threads_spawns_helpers() {
        let pool = ThreadPool::new();
        pool.set_active_threads(3);
        assert_eq!(pool.active_threads(), 3);
        // Helpers + timer.
        assert_eq!(pool.spawned.lock().unwrap().len(), 3);
        pool.shutdown();
    }

    #[test]
    fn helpers_become_available() {
        let pool = ThreadPool::new();
        pool.set_active_threads(2);
        // Give the helper a moment to reach its idle loop.
        for _ in 0..100 {
            if pool.thread_is_available(1, 0) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(pool.idle_worker_exists(0));
        assert!(!pool.thread_is_available(0, 0));
        pool.shutdown();
    }

    #[test]
    fn stop_flag_is_sticky_for_thread_should_stop() {
        let pool = ThreadPool::new();
        assert!(!pool.thread_should_stop(0));
        pool.worker(0).stop.store(true, Ordering::Relaxed);
        assert!(pool.thread_should_stop(0));
        assert!(pool.thread_should_stop(0));
        pool.shutdown();
    }
}
