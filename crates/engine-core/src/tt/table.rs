//! Table proper: power-of-two cluster array, generations, replacement.

use chess::ChessMove;
use std::sync::atomic::{AtomicU8, Ordering};

use super::entry::{TTData, TTEntry};
use super::CLUSTER_SIZE;
use crate::position::Position;
use crate::types::{Bound, Depth, Value, DEPTH_NONE, VALUE_NONE};

#[repr(align(64))]
struct Cluster {
    entries: [TTEntry; CLUSTER_SIZE],
}

impl Cluster {
    const fn new() -> Self {
        Cluster {
            entries: [
                TTEntry::new(),
                TTEntry::new(),
                TTEntry::new(),
                TTEntry::new(),
            ],
        }
    }
}

// One cluster per cache line.
const _: () = assert!(std::mem::size_of::<Cluster>() == 64);

/// Fixed-size concurrent transposition table. Reads and writes are unlocked;
/// see the entry module for how torn accesses are made harmless.
pub struct TranspositionTable {
    clusters: Box<[Cluster]>,
    mask: usize,
    generation: AtomicU8,
}

impl TranspositionTable {
    /// Allocate with the largest power-of-two byte size not exceeding
    /// `mb_size` megabytes. Zero rounds up to a single cluster.
    pub fn new(mb_size: usize) -> Self {
        let cluster_count = Self::cluster_count_for(mb_size);
        let mut clusters = Vec::with_capacity(cluster_count);
        clusters.resize_with(cluster_count, Cluster::new);

        TranspositionTable {
            clusters: clusters.into_boxed_slice(),
            mask: cluster_count - 1,
            generation: AtomicU8::new(0),
        }
    }

    fn cluster_count_for(mb_size: usize) -> usize {
        let bytes = mb_size.saturating_mul(1024 * 1024);
        let count = bytes / std::mem::size_of::<Cluster>();
        if count == 0 {
            1
        } else {
            // Round down to a power of two so indexing is a mask.
            1 << (usize::BITS - 1 - count.leading_zeros())
        }
    }

    /// Reallocate. Only callable while no search holds the table.
    pub fn resize(&mut self, mb_size: usize) {
        *self = TranspositionTable::new(mb_size);
    }

    pub fn clear(&self) {
        self.generation.store(0, Ordering::Relaxed);
        for cluster in self.clusters.iter() {
            for entry in &cluster.entries {
                entry.clear();
            }
        }
    }

    /// Advance the generation; called once per root search.
    pub fn new_search(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn generation(&self) -> u8 {
        self.generation.load(Ordering::Relaxed)
    }

    #[inline]
    fn cluster(&self, key: u64) -> &Cluster {
        &self.clusters[(key as usize) & self.mask]
    }

    /// Look up `key`, validating every decoded field.
    pub fn retrieve(&self, key: u64) -> Option<TTData> {
        let cluster = self.cluster(key);
        for entry in &cluster.entries {
            if let Some(data) = entry.read(key) {
                return Some(data);
            }
        }
        None
    }

    /// Store an entry, stamping it with the current generation.
    ///
    /// Slot choice: a matching key always wins, then an empty slot, then the
    /// slot with the lowest `depth - 8 * age` priority.
    pub fn store(
        &self,
        key: u64,
        value: Value,
        bound: Bound,
        depth: Depth,
        mv: Option<ChessMove>,
        static_eval: bool,
    ) {
        let generation = self.generation();
        let cluster = self.cluster(key);

        let mut replace = &cluster.entries[0];
        let mut replace_score = i32::MAX;

        for entry in &cluster.entries {
            if entry.matches(key) {
                entry.write(key, value, bound, depth, mv, static_eval, generation);
                return;
            }
            if entry.is_empty() {
                entry.write(key, value, bound, depth, mv, static_eval, generation);
                return;
            }
            let score = entry.replace_score(generation);
            if score < replace_score {
                replace_score = score;
                replace = entry;
            }
        }

        replace.write(key, value, bound, depth, mv, static_eval, generation);
    }

    /// Walk `pv` from `pos`, refreshing an exact entry for every position on
    /// it so the line survives table churn between iterations.
    pub fn insert_pv(&self, pos: &mut Position, pv: &[ChessMove]) {
        let mut undo = 0;
        for &mv in pv {
            if !pos.is_legal(mv) {
                break;
            }
            let key = pos.key();
            let keep = self
                .retrieve(key)
                .map(|e| e.bound == Bound::Exact && e.depth > DEPTH_NONE && e.mv == Some(mv))
                .unwrap_or(false);
            if !keep {
                self.store(key, VALUE_NONE, Bound::Exact, DEPTH_NONE, Some(mv), false);
            }
            pos.do_move(mv);
            undo += 1;
        }
        for _ in 0..undo {
            pos.undo_move();
        }
    }

    /// Extract a PV for `pos` by walking the table, bounded by `max_len` and
    /// cycle-checked against repetitions.
    pub fn extract_pv(&self, pos: &mut Position, first: ChessMove, max_len: usize) -> Vec<ChessMove> {
        let mut pv = vec![first];
        pos.do_move(first);
        let mut undo = 1;

        while pv.len() < max_len {
            let Some(entry) = self.retrieve(pos.key()) else {
                break;
            };
            let Some(mv) = entry.mv else { break };
            if !pos.is_legal(mv) || pos.is_draw() {
                break;
            }
            pv.push(mv);
            pos.do_move(mv);
            undo += 1;
        }

        for _ in 0..undo {
            pos.undo_move();
        }
        pv
    }

    /// Occupancy of the current generation in permille, sampled.
    pub fn full(&self) -> u32 {
        let generation = self.generation();
        let sample = self.clusters.len().min(250);
        let mut filled = 0;
        for cluster in self.clusters.iter().take(sample) {
            for entry in &cluster.entries {
                if !entry.is_empty() && entry.relative_age(generation) == 0 {
                    filled += 1;
                }
            }
        }
        (filled * 1000 / (sample * CLUSTER_SIZE)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn sizes_round_down_to_power_of_two() {
        assert_eq!(TranspositionTable::cluster_count_for(0), 1);
        assert_eq!(TranspositionTable::cluster_count_for(1), 1 << 14);
        // 3 MB rounds down to 2 MB worth of clusters.
        assert_eq!(TranspositionTable::cluster_count_for(3), 1 << 15);
    }

    #[test]
    fn store_then_retrieve() {
        let tt = TranspositionTable::new(1);
        let mv = ChessMove::from_str("e2e4").unwrap();
        tt.store(0x1111, 50, Bound::Exact, 8, Some(mv), false);

        let data = tt.retrieve(0x1111).expect("hit");
        assert_eq!(data.value, 50);
        assert_eq!(data.mv, Some(mv));
        assert_eq!(data.bound, Bound::Exact);
        assert!(tt.retrieve(0x2222).is_none());
    }

    #[test]
    fn exact_store_overwrites_same_key() {
        let tt = TranspositionTable::new(1);
        tt.store(0x1111, 50, Bound::Lower, 20, None, false);
        tt.store(0x1111, -10, Bound::Exact, 2, None, false);
        let data = tt.retrieve(0x1111).unwrap();
        assert_eq!(data.value, -10);
        assert_eq!(data.bound, Bound::Exact);
    }

    #[test]
    fn generation_advances_and_wraps() {
        let tt = TranspositionTable::new(1);
        assert_eq!(tt.generation(), 0);
        for _ in 0..300 {
            tt.new_search();
        }
        assert_eq!(tt.generation(), (300 % 256) as u8);
    }

    #[test]
    fn old_shallow_entries_are_evicted_first() {
        let tt = TranspositionTable::new(0); // Single cluster.
        // Fill the cluster: one deep entry, three shallow ones.
        tt.store(1, 0, Bound::Exact, 40, None, false);
        tt.store(2, 0, Bound::Exact, 2, None, false);
        tt.store(3, 0, Bound::Exact, 2, None, false);
        tt.store(4, 0, Bound::Exact, 2, None, false);

        // A new key must evict one of the shallow entries, not the deep one.
        tt.store(5, 0, Bound::Exact, 10, None, false);
        assert!(tt.retrieve(1).is_some());
        assert!(tt.retrieve(5).is_some());
    }

    #[test]
    fn clear_empties_table() {
        let tt = TranspositionTable::new(1);
        tt.store(0x1111, 50, Bound::Exact, 8, None, false);
        tt.clear();
        assert!(tt.retrieve(0x1111).is_none());
        assert_eq!(tt.generation(), 0);
    }

    #[test]
    fn insert_pv_makes_line_reconstructable() {
        let tt = TranspositionTable::new(1);
        let mut pos = Position::startpos();
        let pv: Vec<ChessMove> = ["e2e4", "e7e5", "g1f3"]
            .iter()
            .map(|s| ChessMove::from_str(s).unwrap())
            .collect();

        tt.insert_pv(&mut pos, &pv);

        let extracted = tt.extract_pv(&mut pos, pv[0], 10);
        assert_eq!(&extracted[..3], &pv[..]);
        // Walking the PV must leave the position untouched.
        assert_eq!(pos.key(), Position::startpos().key());
    }

    #[test]
    fn full_reports_permille() {
        let tt = TranspositionTable::new(1);
        assert_eq!(tt.full(), 0);
        for key in 0..4096u64 {
            tt.store(key.wrapping_mul(0x9E37_79B9_7F4A_7C15), 0, Bound::Exact, 4, None, false);
        }
        assert!(tt.full() > 0);
    }
}
