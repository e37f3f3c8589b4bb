//! Pruning and extension helper predicates.

use chess::{BitBoard, ChessMove, Piece, EMPTY};

use super::SearchConfig;
use crate::history::History;
use crate::position::{attacks_from, Position};
use crate::tt::TTData;
use crate::types::{
    mate_in, mated_in, piece_value_midgame, value_from_tt, Depth, Value, ONE_PLY, PLY_MAX,
    VALUE_NONE,
};

/// Can a TT entry substitute for a search at `(depth, beta, ply)`?
/// Move-only entries written by `insert_pv` carry no usable score.
pub fn ok_to_use_tt(tte: &TTData, depth: Depth, beta: Value, ply: usize) -> bool {
    if tte.value == VALUE_NONE {
        return false;
    }
    let v = value_from_tt(tte.value, ply);

    (tte.depth >= depth || v >= mate_in(PLY_MAX).max(beta) || v < mated_in(PLY_MAX).min(beta))
        && ((tte.bound.is_lower() && v >= beta) || (tte.bound.is_upper() && v < beta))
}

/// Sharpen a static evaluation with a TT score bounded in the right
/// direction.
pub fn refine_eval(tte: Option<&TTData>, default_eval: Value, ply: usize) -> Value {
    let Some(tte) = tte else {
        return default_eval;
    };
    if tte.value == VALUE_NONE {
        return default_eval;
    }
    let v = value_from_tt(tte.value, ply);
    if (tte.bound.is_lower() && v >= default_eval) || (tte.bound.is_upper() && v < default_eval) {
        v
    } else {
        default_eval
    }
}

/// True if `m1` (the move that produced this position) somehow enabled `m2`
/// (a move from this position): same piece moved on, vacated destination,
/// discovered line, defense of the target, or an uncovered check.
pub fn connected_moves(pos: &Position, m1: ChessMove, m2: ChessMove) -> bool {
    let board = pos.board();
    let f1 = m1.get_source();
    let t1 = m1.get_dest();
    let f2 = m2.get_source();
    let t2 = m2.get_dest();

    // Case 1: m2 moves the piece m1 just moved.
    if f2 == t1 {
        return true;
    }

    // Case 2: m2 lands on the square m1 vacated.
    if t2 == f1 {
        return true;
    }

    // Case 3: m2 is a slider moving through the vacated square.
    if let Some(p2) = board.piece_on(f2) {
        if is_slider(p2) && chess::between(f2, t2) & BitBoard::from_square(f1) != EMPTY {
            return true;
        }
    }

    // Case 4: the piece m1 moved defends m2's destination.
    if let Some(p1) = board.piece_on(t1) {
        let color = board.color_on(t1).unwrap_or(board.side_to_move());
        if attacks_from(p1, t1, color, *board.combined()) & BitBoard::from_square(t2) != EMPTY {
            return true;
        }

        // Case 5: m1 uncovered a check that m2's mover would re-block or
        // deliver along the line to our king.
        let our_king = board.king_square(board.side_to_move());
        if is_slider(p1) {
            let ray = chess::between(t1, our_king);
            if ray & BitBoard::from_square(f2) != EMPTY
                && ray & BitBoard::from_square(t2) == EMPTY
            {
                return true;
            }
        }
    }

    false
}

#[inline]
fn is_slider(p: Piece) -> bool {
    matches!(p, Piece::Bishop | Piece::Rook | Piece::Queen)
}

/// Is it safe to forward-prune the quiet move `m` given the threat found by
/// the null-move search? Never called for checks, captures or promotions.
pub fn ok_to_prune(pos: &Position, m: ChessMove, threat: Option<ChessMove>) -> bool {
    let Some(threat) = threat else {
        return true;
    };
    let board = pos.board();

    let mfrom = m.get_source();
    let mto = m.get_dest();
    let tfrom = threat.get_source();
    let tto = threat.get_dest();

    // Case 1: never prune a move that runs the threatened piece away.
    if mfrom == tto {
        return false;
    }

    // Case 2: the threat grabs a piece at least as valuable as its own;
    // don't prune moves that defend the target square.
    let threat_is_capture = board.piece_on(tto).is_some();
    if threat_is_capture {
        let attacker_value = board.piece_on(tfrom).map(piece_value_midgame).unwrap_or(0);
        let victim_value = board.piece_on(tto).map(piece_value_midgame).unwrap_or(0);
        if (attacker_value >= victim_value || board.piece_on(tfrom) == Some(Piece::King))
            && pos.move_attacks_square(m, tto)
        {
            return false;
        }
    }

    // Case 3: don't prune safe blocks of a sliding threat.
    if let Some(tp) = board.piece_on(tfrom) {
        if is_slider(tp)
            && chess::between(tfrom, tto) & BitBoard::from_square(mto) != EMPTY
            && pos.see_sign(m) >= 0
        {
            return false;
        }
    }

    true
}

/// Per-feature extension sum, clamped to one ply. The second return value is
/// the `dangerous` flag: an extended or threat-related move is never
/// futility-pruned even when its extension amounts to zero.
#[allow(clippy::too_many_arguments)]
pub fn extension(
    cfg: &SearchConfig,
    pos: &Position,
    m: ChessMove,
    pv_node: bool,
    capture_or_promotion: bool,
    gives_check: bool,
    single_evasion: bool,
    mate_threat: bool,
) -> (Depth, bool) {
    let pv = pv_node as usize;
    let mut result: Depth = 0;
    let mut dangerous = gives_check || single_evasion || mate_threat;

    if gives_check {
        result += cfg.check_extension[pv];
    }
    if single_evasion {
        result += cfg.single_evasion_extension[pv];
    }
    if mate_threat {
        result += cfg.mate_threat_extension[pv];
    }

    if pos.piece_on(m.get_source()) == Some(Piece::Pawn) {
        if pos.is_pawn_push_to_7th(m) {
            result += cfg.pawn_push_to_7th_extension[pv];
            dangerous = true;
        }
        if pos.is_passed_pawn_push(m) {
            result += cfg.passed_pawn_extension[pv];
            dangerous = true;
        }
    }

    // Capture simplifying into a pure pawn endgame.
    if capture_or_promotion
        && pos.piece_on(m.get_dest()).map(|p| p != Piece::Pawn).unwrap_or(false)
        && m.get_promotion().is_none()
        && !pos.is_en_passant(m)
    {
        let total = pos.non_pawn_material(chess::Color::White)
            + pos.non_pawn_material(chess::Color::Black);
        let captured = pos.piece_on(m.get_dest()).map(piece_value_midgame).unwrap_or(0);
        if total - captured == 0 {
            result += cfg.pawn_endgame_extension[pv];
            dangerous = true;
        }
    }

    // PV recapture-ish extension: winning or equal capture of a piece.
    if pv_node
        && capture_or_promotion
        && pos.piece_on(m.get_dest()).map(|p| p != Piece::Pawn).unwrap_or(false)
        && pos.see_sign(m) >= 0
    {
        result += ONE_PLY / 2;
        dangerous = true;
    }

    (result.min(ONE_PLY), dangerous)
}

/// Register the cutoff move as a success and every earlier quiet try as a
/// failure, weighted by the squared depth in plies.
pub fn update_history(
    history: &History,
    pos: &Position,
    cutoff: ChessMove,
    depth: Depth,
    searched: &[ChessMove],
) {
    let us = pos.side_to_move();
    let plies = (depth / ONE_PLY).max(1);

    if let Some(piece) = pos.piece_on(cutoff.get_source()) {
        history.success(us, piece, cutoff.get_dest(), plies);
    }

    for &m in searched {
        if m == cutoff || pos.is_capture_or_promotion(m) {
            continue;
        }
        if let Some(piece) = pos.piece_on(m.get_source()) {
            history.failure(us, piece, m.get_dest(), plies);
        }
    }
}

/// Record the static-eval swing of the opponent's last quiet move.
pub fn update_gains(
    history: &History,
    pos: &Position,
    prev_move: Option<ChessMove>,
    prev_was_quiet: bool,
    before: Value,
    after: Value,
) {
    let Some(m) = prev_move else { return };
    if !prev_was_quiet || before == VALUE_NONE || after == VALUE_NONE {
        return;
    }
    // The mover is the side that is not to move now.
    let mover = !pos.side_to_move();
    if let Some(piece) = pos.piece_on(m.get_dest()) {
        history.update_gain(mover, piece, m.get_dest(), -(before + after));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bound;
    use std::str::FromStr;

    fn entry(value: Value, depth: Depth, bound: Bound) -> TTData {
        TTData {
            mv: None,
            value,
            depth,
            bound,
            static_eval: false,
            generation: 0,
        }
    }

    #[test]
    fn tt_usable_only_with_matching_bound_direction() {
        let lower = entry(120, 10, Bound::Lower);
        assert!(ok_to_use_tt(&lower, 8, 100, 0));
        // Lower bound below beta proves nothing.
        assert!(!ok_to_use_tt(&lower, 8, 200, 0));

        let upper = entry(80, 10, Bound::Upper);
        assert!(ok_to_use_tt(&upper, 8, 100, 0));
        assert!(!ok_to_use_tt(&upper, 8, 50, 0));

        // Too shallow, non-mate: unusable either way.
        let shallow = entry(120, 4, Bound::Lower);
        assert!(!ok_to_use_tt(&shallow, 8, 100, 0));
    }

    #[test]
    fn refine_eval_uses_consistent_bounds() {
        let lower = entry(150, 4, Bound::Lower);
        assert_eq!(refine_eval(Some(&lower), 100, 0), 150);
        assert_eq!(refine_eval(Some(&lower), 200, 0), 200);

        let upper = entry(50, 4, Bound::Upper);
        assert_eq!(refine_eval(Some(&upper), 100, 0), 50);
        assert_eq!(refine_eval(None, 77, 0), 77);
    }

    #[test]
    fn moves_of_the_same_piece_are_connected() {
        let mut pos = Position::startpos();
        pos.do_move(ChessMove::from_str("e2e4").unwrap());
        pos.do_move(ChessMove::from_str("b8c6").unwrap());
        // Black's knight move enabled Nc6-d4 with the same piece.
        let m1 = ChessMove::from_str("b8c6").unwrap();
        let m2 = ChessMove::from_str("c6d4").unwrap();
        assert!(connected_moves(&pos, m1, m2));
        // An unrelated pawn move is not connected.
        let unrelated = ChessMove::from_str("h2h3").unwrap();
        assert!(!connected_moves(&pos, m1, unrelated));
    }

    #[test]
    fn prunable_without_threat() {
        let pos = Position::startpos();
        let m = ChessMove::from_str("a2a3").unwrap();
        assert!(ok_to_prune(&pos, m, None));
    }

    #[test]
    fn never_prune_escape_of_threatened_piece() {
        // Black queen on d5 is attacked by the rook's threat Rd1xd5.
        let pos = Position::from_fen("4k3/8/8/3q4/8/8/8/3RK3 b - - 0 1").unwrap();
        let threat = ChessMove::from_str("d1d5").unwrap();
        let escape = ChessMove::from_str("d5a5").unwrap();
        assert!(!ok_to_prune(&pos, escape, Some(threat)));
    }

    #[test]
    fn check_extension_applies() {
        let cfg = SearchConfig::default();
        let pos = Position::startpos();
        let m = ChessMove::from_str("e2e4").unwrap();
        let (ext, dangerous) = extension(&cfg, &pos, m, true, false, true, false, false);
        assert_eq!(ext, cfg.check_extension[1]);
        assert!(dangerous);
    }

    #[test]
    fn extension_is_clamped_to_one_ply() {
        let cfg = SearchConfig::default();
        // Pawn push to 7th? Already on 7th; push to 8th is a promotion.
        // Use a 6th->7th push position instead.
        let pos2 = Position::from_fen("4k3/8/3P4/8/8/8/8/4K3 w - - 0 1").unwrap();
        let m = ChessMove::from_str("d6d7").unwrap();
        let (ext, dangerous) = extension(&cfg, &pos2, m, true, false, true, true, false);
        assert_eq!(ext, ONE_PLY);
        assert!(dangerous);
    }
}
