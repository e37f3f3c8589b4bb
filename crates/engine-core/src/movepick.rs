//! Staged move picker.
//!
//! Moves are produced lazily in decreasing order of expected cutoff
//! probability: TT move, good captures, mate killer and killers, quiet moves
//! by history, bad captures last. When in check only evasions are generated;
//! in quiescence only captures, queen promotions and (near the horizon)
//! checking moves.

use chess::{BitBoard, Board, ChessMove, MoveGen, Piece, EMPTY};
use smallvec::SmallVec;
use std::sync::Arc;

use crate::history::History;
use crate::position::{board_is_capture, board_is_en_passant, board_see, board_see_sign, Position};
use crate::types::{piece_value_midgame, Depth, Value};

/// Stage the picker is currently yielding from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    TtMove,
    GenCaptures,
    GoodCaptures,
    MateKiller,
    Killers,
    GenQuiets,
    Quiets,
    BadCaptures,
    GenEvasions,
    Evasions,
    GenQsearchCaptures,
    QsearchCaptures,
    GenQsearchChecks,
    QsearchChecks,
    Stop,
}

#[derive(Clone, Copy)]
struct ScoredMove {
    mv: ChessMove,
    score: Value,
}

/// Lazy producer of candidate moves for one node.
pub struct MovePicker {
    board: Board,
    tt_move: Option<ChessMove>,
    mate_killer: Option<ChessMove>,
    killers: [Option<ChessMove>; 2],
    history: Arc<History>,
    depth: Depth,
    phase: Phase,
    qsearch: bool,
    /// Moves already yielded by the hint stages, excluded from generation.
    tried: SmallVec<[ChessMove; 4]>,
    moves: Vec<ScoredMove>,
    bad_captures: Vec<ScoredMove>,
    current: usize,
    evasions: Option<usize>,
}

impl MovePicker {
    /// Picker for the main search.
    pub fn new(
        pos: &Position,
        tt_move: Option<ChessMove>,
        depth: Depth,
        history: Arc<History>,
        killers: [Option<ChessMove>; 2],
        mate_killer: Option<ChessMove>,
    ) -> Self {
        let board = *pos.board();
        let in_check = *board.checkers() != EMPTY;
        MovePicker {
            board,
            tt_move: tt_move.filter(|&m| board.legal(m)),
            mate_killer,
            killers,
            history,
            depth,
            phase: Phase::TtMove,
            qsearch: false,
            tried: SmallVec::new(),
            moves: Vec::new(),
            bad_captures: Vec::new(),
            current: 0,
            evasions: if in_check { Some(0) } else { None },
        }
    }

    /// Picker for quiescence. Checking moves are generated only when the
    /// caller passes `depth == DEPTH_ZERO`; pass a lower depth to restrict
    /// the picker to captures and queen promotions.
    pub fn new_qsearch(
        pos: &Position,
        tt_move: Option<ChessMove>,
        depth: Depth,
        history: Arc<History>,
    ) -> Self {
        let mut picker = Self::new(pos, tt_move, depth, history, [None; 2], None);
        picker.qsearch = true;
        picker
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of legal evasions; meaningful only after the first
    /// [`next_move`](Self::next_move) call at an in-check node.
    pub fn number_of_evasions(&self) -> usize {
        self.evasions.unwrap_or(0)
    }

    /// Produce the next move, or `None` when the node is exhausted. Every
    /// legal move is yielded at most once.
    pub fn next_move(&mut self) -> Option<ChessMove> {
        loop {
            match self.phase {
                Phase::TtMove => {
                    self.phase = if self.evasions.is_some() {
                        Phase::GenEvasions
                    } else if self.qsearch {
                        Phase::GenQsearchCaptures
                    } else {
                        Phase::GenCaptures
                    };
                    if let Some(mv) = self.tt_move {
                        self.tried.push(mv);
                        return Some(mv);
                    }
                }

                Phase::GenCaptures => {
                    self.generate_captures();
                    self.phase = Phase::GoodCaptures;
                    self.current = 0;
                }

                Phase::GoodCaptures => match self.pick_next() {
                    Some(mv) => {
                        let see = board_see_sign(&self.board, mv);
                        if see >= 0 {
                            return Some(mv);
                        }
                        self.bad_captures.push(ScoredMove { mv, score: see });
                    }
                    None => {
                        self.phase = Phase::MateKiller;
                    }
                },

                Phase::MateKiller => {
                    self.phase = Phase::Killers;
                    self.current = 0;
                    if let Some(mv) = self.mate_killer {
                        if !self.tried.contains(&mv) && self.board.legal(mv) {
                            self.tried.push(mv);
                            return Some(mv);
                        }
                    }
                }

                Phase::Killers => {
                    if self.current < self.killers.len() {
                        let slot = self.killers[self.current];
                        self.current += 1;
                        if let Some(mv) = slot {
                            if !self.tried.contains(&mv)
                                && !board_is_capture(&self.board, mv)
                                && mv.get_promotion().is_none()
                                && self.board.legal(mv)
                            {
                                self.tried.push(mv);
                                return Some(mv);
                            }
                        }
                    } else {
                        self.phase = Phase::GenQuiets;
                    }
                }

                Phase::GenQuiets => {
                    self.generate_quiets();
                    self.phase = Phase::Quiets;
                    self.current = 0;
                }

                Phase::Quiets => match self.pick_next() {
                    Some(mv) => return Some(mv),
                    None => {
                        self.moves = std::mem::take(&mut self.bad_captures);
                        self.moves.sort_unstable_by_key(|sm| -sm.score);
                        self.phase = Phase::BadCaptures;
                        self.current = 0;
                    }
                },

                Phase::BadCaptures => match self.pick_next() {
                    Some(mv) => return Some(mv),
                    None => self.phase = Phase::Stop,
                },

                Phase::GenEvasions => {
                    self.generate_evasions();
                    self.phase = Phase::Evasions;
                    self.current = 0;
                }

                Phase::Evasions => match self.pick_next() {
                    Some(mv) => return Some(mv),
                    None => self.phase = Phase::Stop,
                },

                Phase::GenQsearchCaptures => {
                    self.generate_qsearch_captures();
                    self.phase = Phase::QsearchCaptures;
                    self.current = 0;
                }

                Phase::QsearchCaptures => match self.pick_next() {
                    Some(mv) => return Some(mv),
                    None => {
                        // Checking moves only right at the horizon.
                        self.phase = if self.depth >= 0 {
                            Phase::GenQsearchChecks
                        } else {
                            Phase::Stop
                        };
                    }
                },

                Phase::GenQsearchChecks => {
                    self.generate_qsearch_checks();
                    self.phase = Phase::QsearchChecks;
                    self.current = 0;
                }

                Phase::QsearchChecks => match self.pick_next() {
                    Some(mv) => return Some(mv),
                    None => self.phase = Phase::Stop,
                },

                Phase::Stop => return None,
            }
        }
    }

    /// Next unseen move from the sorted `moves` buffer.
    fn pick_next(&mut self) -> Option<ChessMove> {
        while self.current < self.moves.len() {
            let mv = self.moves[self.current].mv;
            self.current += 1;
            if !self.tried.contains(&mv) {
                return Some(mv);
            }
        }
        None
    }

    fn capture_mask(&self) -> BitBoard {
        let mut mask = *self.board.color_combined(!self.board.side_to_move());
        if let Some(ep) = self.board.en_passant() {
            // Cover both the capturable pawn and the landing square, so the
            // generator's en-passant destination is always in the mask.
            mask |= BitBoard::from_square(ep);
            let landing = match self.board.side_to_move() {
                chess::Color::White => ep.up(),
                chess::Color::Black => ep.down(),
            };
            if let Some(sq) = landing {
                mask |= BitBoard::from_square(sq);
            }
        }
        mask
    }

    fn generate_captures(&mut self) {
        let mut gen = MoveGen::new_legal(&self.board);
        gen.set_iterator_mask(self.capture_mask() | Self::back_ranks());
        self.moves.clear();
        for mv in gen {
            let is_capture = board_is_capture(&self.board, mv);
            let promo = mv.get_promotion();
            // Queen promotions travel with the captures; underpromotions are
            // ordinary quiet moves.
            let keep = (is_capture && (promo.is_none() || promo == Some(Piece::Queen)))
                || (!is_capture && promo == Some(Piece::Queen));
            if keep {
                self.moves.push(ScoredMove {
                    mv,
                    score: self.mvv_lva(mv),
                });
            }
        }
        self.moves.sort_unstable_by_key(|sm| -sm.score);
    }

    fn generate_quiets(&mut self) {
        let mut gen = MoveGen::new_legal(&self.board);
        gen.set_iterator_mask(!*self.board.combined());
        self.moves.clear();
        for mv in gen {
            if board_is_en_passant(&self.board, mv) || mv.get_promotion() == Some(Piece::Queen) {
                continue; // Already produced by the capture stage.
            }
            let score = match self.board.piece_on(mv.get_source()) {
                Some(piece) => {
                    self.history
                        .score(self.board.side_to_move(), piece, mv.get_dest())
                }
                None => 0,
            };
            self.moves.push(ScoredMove { mv, score });
        }
        self.moves.sort_unstable_by_key(|sm| -sm.score);
    }

    fn generate_evasions(&mut self) {
        self.moves.clear();
        for mv in MoveGen::new_legal(&self.board) {
            // Captures first by victim value, quiet evasions by history.
            let score = if board_is_capture(&self.board, mv) {
                100_000 + self.mvv_lva(mv)
            } else {
                match self.board.piece_on(mv.get_source()) {
                    Some(piece) => {
                        self.history
                            .score(self.board.side_to_move(), piece, mv.get_dest())
                    }
                    None => 0,
                }
            };
            self.moves.push(ScoredMove { mv, score });
        }
        self.evasions = Some(self.moves.len());
        self.moves.sort_unstable_by_key(|sm| -sm.score);
    }

    fn generate_qsearch_captures(&mut self) {
        self.generate_captures();
    }

    fn generate_qsearch_checks(&mut self) {
        let mut gen = MoveGen::new_legal(&self.board);
        gen.set_iterator_mask(!*self.board.combined());
        self.moves.clear();
        for mv in gen {
            if mv.get_promotion().is_some() || board_is_en_passant(&self.board, mv) {
                continue;
            }
            if *self.board.make_move_new(mv).checkers() == EMPTY {
                continue;
            }
            let score = board_see(&self.board, mv);
            self.moves.push(ScoredMove { mv, score });
        }
        self.moves.sort_unstable_by_key(|sm| -sm.score);
    }

    fn mvv_lva(&self, mv: ChessMove) -> Value {
        let victim = if board_is_en_passant(&self.board, mv) {
            piece_value_midgame(Piece::Pawn)
        } else {
            self.board
                .piece_on(mv.get_dest())
                .map(piece_value_midgame)
                .unwrap_or(0)
        };
        let attacker = self
            .board
            .piece_on(mv.get_source())
            .map(piece_value_midgame)
            .unwrap_or(0);
        let promo_bonus = if mv.get_promotion() == Some(Piece::Queen) {
            piece_value_midgame(Piece::Queen)
        } else {
            0
        };
        victim * 8 - attacker / 16 + promo_bonus
    }

    fn back_ranks() -> BitBoard {
        BitBoard(0xFF00_0000_0000_00FF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ONE_PLY;
    use std::collections::HashSet;
    use std::str::FromStr;

    fn drain(picker: &mut MovePicker) -> Vec<ChessMove> {
        let mut out = Vec::new();
        while let Some(mv) = picker.next_move() {
            out.push(mv);
        }
        out
    }

    #[test]
    fn yields_every_legal_move_exactly_once() {
        let pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let history = Arc::new(History::new());
        let tt_move = Some(ChessMove::from_str("e2a6").unwrap());
        let mut picker = MovePicker::new(&pos, tt_move, 6 * ONE_PLY, history, [None; 2], None);

        let yielded = drain(&mut picker);
        let legal: HashSet<_> = pos.legal_moves().into_iter().collect();
        let unique: HashSet<_> = yielded.iter().copied().collect();

        assert_eq!(unique.len(), yielded.len(), "duplicate moves yielded");
        assert_eq!(unique, legal);
    }

    #[test]
    fn tt_move_comes_first() {
        let pos = Position::startpos();
        let history = Arc::new(History::new());
        let tt_move = Some(ChessMove::from_str("d2d4").unwrap());
        let mut picker = MovePicker::new(&pos, tt_move, 4 * ONE_PLY, history, [None; 2], None);
        assert_eq!(picker.next_move(), tt_move);
    }

    #[test]
    fn illegal_tt_move_is_dropped() {
        let pos = Position::startpos();
        let history = Arc::new(History::new());
        let tt_move = Some(ChessMove::from_str("e2e5").unwrap());
        let mut picker = MovePicker::new(&pos, tt_move, 4 * ONE_PLY, history, [None; 2], None);
        let yielded = drain(&mut picker);
        assert!(!yielded.contains(&tt_move.unwrap()));
        assert_eq!(yielded.len(), 20);
    }

    #[test]
    fn good_capture_before_quiet_moves() {
        // White can win a queen with e4xd5.
        let pos = Position::from_fen("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let history = Arc::new(History::new());
        let mut picker = MovePicker::new(&pos, None, 4 * ONE_PLY, history, [None; 2], None);
        let first = picker.next_move().unwrap();
        assert_eq!(first, ChessMove::from_str("e4d5").unwrap());
    }

    #[test]
    fn losing_capture_comes_last() {
        // Qd2xd6 loses the queen to the c7 pawn.
        let pos = Position::from_fen("4k3/2p5/3p4/8/8/8/3Q4/4K3 w - - 0 1").unwrap();
        let history = Arc::new(History::new());
        let mut picker = MovePicker::new(&pos, None, 4 * ONE_PLY, history.clone(), [None; 2], None);
        let yielded = drain(&mut picker);
        let losing = ChessMove::from_str("d2d6").unwrap();
        assert_eq!(*yielded.last().unwrap(), losing);
    }

    #[test]
    fn killer_is_yielded_before_other_quiets() {
        let pos = Position::startpos();
        let history = Arc::new(History::new());
        let killer = ChessMove::from_str("b1c3").unwrap();
        let mut picker =
            MovePicker::new(&pos, None, 4 * ONE_PLY, history, [Some(killer), None], None);
        // No captures available at startpos, so the killer leads.
        assert_eq!(picker.next_move(), Some(killer));
    }

    #[test]
    fn evasions_counted_in_check() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/4q3/4K3 w - - 0 1").unwrap();
        assert!(pos.in_check());
        let history = Arc::new(History::new());
        let mut picker = MovePicker::new(&pos, None, 4 * ONE_PLY, history, [None; 2], None);
        let yielded = drain(&mut picker);
        assert_eq!(picker.number_of_evasions(), yielded.len());
        let legal: HashSet<_> = pos.legal_moves().into_iter().collect();
        assert_eq!(yielded.iter().copied().collect::<HashSet<_>>(), legal);
    }

    #[test]
    fn qsearch_yields_only_tactical_moves() {
        let pos =
            Position::from_fen("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 0 1")
                .unwrap();
        let history = Arc::new(History::new());
        let mut picker = MovePicker::new_qsearch(&pos, None, -2 * ONE_PLY, history);
        let yielded = drain(&mut picker);
        for mv in &yielded {
            assert!(
                pos.is_capture_or_promotion(*mv),
                "non-tactical move {mv} in qsearch"
            );
        }
    }

    #[test]
    fn qsearch_at_horizon_includes_checks() {
        // Rook can give check on e-file without capturing.
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").unwrap();
        let history = Arc::new(History::new());
        let mut picker = MovePicker::new_qsearch(&pos, None, 0, history);
        let yielded = drain(&mut picker);
        assert!(yielded.iter().any(|mv| pos.gives_check(*mv)));
    }
}
