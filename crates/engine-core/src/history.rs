//! History and gains statistics shared by all workers.
//!
//! Updates are rare compared to reads, so entries are plain relaxed atomics;
//! a lost update costs nothing but a slightly stale ordering hint.

use chess::{Color, Piece, Square};
use std::sync::atomic::{AtomicI32, Ordering};

use crate::types::Value;

/// Hard bound on history scores; every update keeps `|score| < HISTORY_MAX`.
pub const HISTORY_MAX: i32 = 50_000;

const SLOTS: usize = 2 * 6 * 64;

#[inline]
fn index(color: Color, piece: Piece, to: Square) -> usize {
    let c = color as usize;
    let p = piece as usize;
    c * 6 * 64 + p * 64 + to.to_index()
}

/// Butterfly history table indexed by mover color, piece and destination.
pub struct History {
    scores: [AtomicI32; SLOTS],
    gains: [AtomicI32; SLOTS],
}

impl History {
    pub fn new() -> Self {
        History {
            scores: std::array::from_fn(|_| AtomicI32::new(0)),
            gains: std::array::from_fn(|_| AtomicI32::new(0)),
        }
    }

    pub fn clear(&self) {
        for slot in &self.scores {
            slot.store(0, Ordering::Relaxed);
        }
        for slot in &self.gains {
            slot.store(0, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn score(&self, color: Color, piece: Piece, to: Square) -> i32 {
        self.scores[index(color, piece, to)].load(Ordering::Relaxed)
    }

    /// Reward a quiet move that caused a beta cutoff, weighted by the square
    /// of the search depth (in plies).
    pub fn success(&self, color: Color, piece: Piece, to: Square, depth_plies: i32) {
        self.bump(color, piece, to, depth_plies * depth_plies);
    }

    /// Penalize a quiet move that was searched before the cutoff move.
    pub fn failure(&self, color: Color, piece: Piece, to: Square, depth_plies: i32) {
        self.bump(color, piece, to, -(depth_plies * depth_plies));
    }

    fn bump(&self, color: Color, piece: Piece, to: Square, by: i32) {
        let slot = &self.scores[index(color, piece, to)];
        let old = slot.load(Ordering::Relaxed);
        let new = (old + by).clamp(-(HISTORY_MAX - 1), HISTORY_MAX - 1);
        // A failed exchange means a concurrent update won; that is fine.
        let _ = slot.compare_exchange_weak(old, new, Ordering::Relaxed, Ordering::Relaxed);
    }

    /// Record the static-eval swing a quiet move produced, used by the
    /// futility margin. Decays by one per visit so stale spikes fade.
    pub fn update_gain(&self, color: Color, piece: Piece, to: Square, gain: Value) {
        let slot = &self.gains[index(color, piece, to)];
        let old = slot.load(Ordering::Relaxed);
        slot.store(gain.max(old - 1), Ordering::Relaxed);
    }

    #[inline]
    pub fn gain(&self, color: Color, piece: Piece, to: Square) -> Value {
        self.gains[index(color, piece, to)].load(Ordering::Relaxed)
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_failure_move_the_score() {
        let h = History::new();
        h.success(Color::White, Piece::Knight, Square::F3, 6);
        assert_eq!(h.score(Color::White, Piece::Knight, Square::F3), 36);
        h.failure(Color::White, Piece::Knight, Square::F3, 4);
        assert_eq!(h.score(Color::White, Piece::Knight, Square::F3), 20);
        // Other slots untouched.
        assert_eq!(h.score(Color::Black, Piece::Knight, Square::F3), 0);
    }

    #[test]
    fn scores_stay_bounded() {
        let h = History::new();
        for _ in 0..1000 {
            h.success(Color::White, Piece::Queen, Square::D5, 40);
            assert!(h.score(Color::White, Piece::Queen, Square::D5).abs() < HISTORY_MAX);
        }
        for _ in 0..2000 {
            h.failure(Color::White, Piece::Queen, Square::D5, 40);
            assert!(h.score(Color::White, Piece::Queen, Square::D5).abs() < HISTORY_MAX);
        }
    }

    #[test]
    fn gains_keep_the_maximum_with_decay() {
        let h = History::new();
        h.update_gain(Color::White, Piece::Rook, Square::E4, 50);
        assert_eq!(h.gain(Color::White, Piece::Rook, Square::E4), 50);
        h.update_gain(Color::White, Piece::Rook, Square::E4, 10);
        assert_eq!(h.gain(Color::White, Piece::Rook, Square::E4), 49);
    }

    #[test]
    fn clear_resets_everything() {
        let h = History::new();
        h.success(Color::White, Piece::Pawn, Square::E4, 10);
        h.update_gain(Color::White, Piece::Pawn, Square::E4, 33);
        h.clear();
        assert_eq!(h.score(Color::White, Piece::Pawn, Square::E4), 0);
        assert_eq!(h.gain(Color::White, Piece::Pawn, Square::E4), 0);
    }
}
