//! Piece-square tables, white's point of view; black squares are mirrored.

use chess::{Color, Piece, Square};

use crate::types::Value;

#[rustfmt::skip]
const PAWN_MG: [Value; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
     -8,   2,   4, -12, -12,   4,   2,  -8,
     -8,   2,   8,   4,   4,   8,   2,  -8,
     -8,   2,  16,  24,  24,  16,   2,  -8,
     -4,   6,  20,  28,  28,  20,   6,  -4,
      4,  12,  24,  32,  32,  24,  12,   4,
     16,  24,  32,  40,  40,  32,  24,  16,
      0,   0,   0,   0,   0,   0,   0,   0,
];

#[rustfmt::skip]
const PAWN_EG: [Value; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
      2,   2,   2,   2,   2,   2,   2,   2,
      4,   4,   4,   4,   4,   4,   4,   4,
      8,   8,   8,   8,   8,   8,   8,   8,
     16,  16,  16,  16,  16,  16,  16,  16,
     32,  32,  32,  32,  32,  32,  32,  32,
     56,  56,  56,  56,  56,  56,  56,  56,
      0,   0,   0,   0,   0,   0,   0,   0,
];

#[rustfmt::skip]
const KNIGHT_MG: [Value; 64] = [
    -60, -40, -30, -26, -26, -30, -40, -60,
    -36, -16,   0,   4,   4,   0, -16, -36,
    -26,   6,  14,  18,  18,  14,   6, -26,
    -20,   8,  20,  26,  26,  20,   8, -20,
    -16,  10,  22,  28,  28,  22,  10, -16,
    -20,  12,  24,  26,  26,  24,  12, -20,
    -34, -10,   6,  10,  10,   6, -10, -34,
    -70, -36, -22, -16, -16, -22, -36, -70,
];

#[rustfmt::skip]
const KNIGHT_EG: [Value; 64] = [
    -40, -28, -18, -12, -12, -18, -28, -40,
    -26, -12,  -2,   4,   4,  -2, -12, -26,
    -16,   0,  10,  16,  16,  10,   0, -16,
    -10,   6,  16,  24,  24,  16,   6, -10,
    -10,   6,  16,  24,  24,  16,   6, -10,
    -16,   0,  10,  16,  16,  10,   0, -16,
    -26, -12,  -2,   4,   4,  -2, -12, -26,
    -40, -28, -18, -12, -12, -18, -28, -40,
];

#[rustfmt::skip]
const BISHOP_MG: [Value; 64] = [
    -18, -10,  -8,  -6,  -6,  -8, -10, -18,
     -8,   8,   4,   6,   6,   4,   8,  -8,
     -6,   6,  10,  10,  10,  10,   6,  -6,
     -4,   8,  12,  16,  16,  12,   8,  -4,
     -4,   8,  12,  16,  16,  12,   8,  -4,
     -6,   6,  10,  10,  10,  10,   6,  -6,
     -8,   2,   4,   6,   6,   4,   2,  -8,
    -18, -10,  -8,  -6,  -6,  -8, -10, -18,
];

#[rustfmt::skip]
const BISHOP_EG: [Value; 64] = [
    -16,  -8,  -6,  -4,  -4,  -6,  -8, -16,
     -8,   0,   2,   4,   4,   2,   0,  -8,
     -6,   2,   6,   8,   8,   6,   2,  -6,
     -4,   4,   8,  12,  12,   8,   4,  -4,
     -4,   4,   8,  12,  12,   8,   4,  -4,
     -6,   2,   6,   8,   8,   6,   2,  -6,
     -8,   0,   2,   4,   4,   2,   0,  -8,
    -16,  -8,  -6,  -4,  -4,  -6,  -8, -16,
];

#[rustfmt::skip]
const ROOK_MG: [Value; 64] = [
     -6,  -3,   0,   3,   3,   0,  -3,  -6,
     -6,  -3,   0,   3,   3,   0,  -3,  -6,
     -6,  -3,   0,   3,   3,   0,  -3,  -6,
     -6,  -3,   0,   3,   3,   0,  -3,  -6,
     -6,  -3,   0,   3,   3,   0,  -3,  -6,
     -6,  -3,   0,   3,   3,   0,  -3,  -6,
      4,   8,  10,  12,  12,  10,   8,   4,
     -6,  -3,   0,   3,   3,   0,  -3,  -6,
];

const ROOK_EG: [Value; 64] = [0; 64];

#[rustfmt::skip]
const QUEEN_MG: [Value; 64] = [
    -10,  -6,  -4,   0,   0,  -4,  -6, -10,
     -6,   0,   2,   4,   4,   2,   0,  -6,
     -4,   2,   6,   6,   6,   6,   2,  -4,
      0,   4,   6,   8,   8,   6,   4,   0,
      0,   4,   6,   8,   8,   6,   4,   0,
     -4,   2,   6,   6,   6,   6,   2,  -4,
     -6,   0,   2,   4,   4,   2,   0,  -6,
    -10,  -6,  -4,   0,   0,  -4,  -6, -10,
];

#[rustfmt::skip]
const QUEEN_EG: [Value; 64] = [
    -16, -10,  -6,  -4,  -4,  -6, -10, -16,
    -10,  -4,   0,   2,   2,   0,  -4, -10,
     -6,   0,   6,   8,   8,   6,   0,  -6,
     -4,   2,   8,  12,  12,   8,   2,  -4,
     -4,   2,   8,  12,  12,   8,   2,  -4,
     -6,   0,   6,   8,   8,   6,   0,  -6,
    -10,  -4,   0,   2,   2,   0,  -4, -10,
    -16, -10,  -6,  -4,  -4,  -6, -10, -16,
];

#[rustfmt::skip]
const KING_MG: [Value; 64] = [
     28,  36,  12,   0,   0,  20,  40,  28,
     24,  24,   0, -12, -12,   0,  24,  24,
    -12, -16, -24, -36, -36, -24, -16, -12,
    -28, -36, -44, -56, -56, -44, -36, -28,
    -40, -48, -56, -68, -68, -56, -48, -40,
    -48, -56, -64, -76, -76, -64, -56, -48,
    -56, -64, -72, -84, -84, -72, -64, -56,
    -64, -72, -80, -92, -92, -80, -72, -64,
];

#[rustfmt::skip]
const KING_EG: [Value; 64] = [
    -48, -32, -22, -16, -16, -22, -32, -48,
    -28, -10,  -2,   4,   4,  -2, -10, -28,
    -18,   0,  12,  18,  18,  12,   0, -18,
    -12,   6,  18,  28,  28,  18,   6, -12,
    -12,   6,  18,  28,  28,  18,   6, -12,
    -18,   0,  12,  18,  18,  12,   0, -18,
    -28, -10,  -2,   4,   4,  -2, -10, -28,
    -48, -32, -22, -16, -16, -22, -32, -48,
];

/// Midgame/endgame bonus for `piece` of `color` on `sq`, from the owner's
/// point of view.
#[inline]
pub fn bonus(piece: Piece, color: Color, sq: Square) -> (Value, Value) {
    let idx = match color {
        Color::White => sq.to_index(),
        Color::Black => sq.to_index() ^ 56,
    };
    match piece {
        Piece::Pawn => (PAWN_MG[idx], PAWN_EG[idx]),
        Piece::Knight => (KNIGHT_MG[idx], KNIGHT_EG[idx]),
        Piece::Bishop => (BISHOP_MG[idx], BISHOP_EG[idx]),
        Piece::Rook => (ROOK_MG[idx], ROOK_EG[idx]),
        Piece::Queen => (QUEEN_MG[idx], QUEEN_EG[idx]),
        Piece::King => (KING_MG[idx], KING_EG[idx]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_mirrored_for_black() {
        let (w_mg, w_eg) = bonus(Piece::Knight, Color::White, Square::F3);
        let (b_mg, b_eg) = bonus(Piece::Knight, Color::Black, Square::F6);
        assert_eq!(w_mg, b_mg);
        assert_eq!(w_eg, b_eg);
    }

    #[test]
    fn central_knight_beats_corner_knight() {
        let (corner, _) = bonus(Piece::Knight, Color::White, Square::A1);
        let (center, _) = bonus(Piece::Knight, Color::White, Square::E4);
        assert!(center > corner);
    }
}
