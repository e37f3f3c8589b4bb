//! Static evaluation: tapered material + piece-square tables + pawn
//! structure. Pawn and material terms are served from per-worker caches so
//! the hot path never contends with other threads.

mod material;
mod pawns;
mod pst;

pub use material::MaterialTable;
pub use pawns::PawnTable;

use chess::{Color, Piece, EMPTY};

use crate::position::Position;
use crate::types::Value;

/// Midgame phase weight; 0 is a pure endgame.
pub const PHASE_MIDGAME: i32 = 128;

/// Small bonus for having the move.
const TEMPO: Value = 10;

/// Per-worker evaluation caches. Each worker owns one; entries never move
/// under a reader's feet.
pub struct EvalCaches {
    pub pawns: PawnTable,
    pub material: MaterialTable,
}

impl Default for EvalCaches {
    fn default() -> Self {
        EvalCaches {
            pawns: PawnTable::new(),
            material: MaterialTable::new(),
        }
    }
}

/// Evaluate `pos` from the side to move's point of view, in centipawns.
pub fn evaluate(pos: &Position, caches: &mut EvalCaches) -> Value {
    let board = pos.board();

    let mat = caches.material.probe(board);
    let pawn = caches.pawns.probe(board);

    let mut mg = mat.mg + pawn.mg;
    let mut eg = mat.eg + pawn.eg;

    for sq in *board.combined() {
        let piece = board.piece_on(sq).unwrap_or(Piece::Pawn);
        let color = board.color_on(sq).unwrap_or(Color::White);
        let (p_mg, p_eg) = pst::bonus(piece, color, sq);
        match color {
            Color::White => {
                mg += p_mg;
                eg += p_eg;
            }
            Color::Black => {
                mg -= p_mg;
                eg -= p_eg;
            }
        }
    }

    let phase = mat.phase;
    let white_score = (mg * phase + eg * (PHASE_MIDGAME - phase)) / PHASE_MIDGAME;

    let score = match board.side_to_move() {
        Color::White => white_score,
        Color::Black => -white_score,
    };
    score + TEMPO
}

/// True when `color` still has sliders or knights; used by the null-move
/// zugzwang guard.
pub fn has_non_pawn_material(pos: &Position, color: Color) -> bool {
    let board = pos.board();
    let us = board.color_combined(color);
    let non_pawn = board.pieces(Piece::Knight)
        | board.pieces(Piece::Bishop)
        | board.pieces(Piece::Rook)
        | board.pieces(Piece::Queen);
    non_pawn & us != EMPTY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startpos_is_roughly_balanced() {
        let pos = Position::startpos();
        let mut caches = EvalCaches::default();
        let v = evaluate(&pos, &mut caches);
        assert!(v.abs() < 60, "startpos eval too lopsided: {v}");
    }

    #[test]
    fn extra_queen_dominates() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/3QK3 w - - 0 1").unwrap();
        let mut caches = EvalCaches::default();
        assert!(evaluate(&pos, &mut caches) > 800);

        // Same position from the other side's point of view.
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/3QK3 b - - 0 1").unwrap();
        assert!(evaluate(&pos, &mut caches) < -800);
    }

    #[test]
    fn eval_is_cached_consistently(){
        let pos = Position::startpos();
        let mut caches = EvalCaches::default();
        let first = evaluate(&pos, &mut caches);
        let second = evaluate(&pos, &mut caches);
        assert_eq!(first, second);
    }

    #[test]
    fn non_pawn_material_guard() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").unwrap();
        assert!(!has_non_pawn_material(&pos, Color::White));
        let pos = Position::startpos();
        assert!(has_non_pawn_material(&pos, Color::White));
    }
}
