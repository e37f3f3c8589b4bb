//! Per-ply scratch state.

use chess::ChessMove;
use smallvec::SmallVec;

use crate::types::{Depth, Value, VALUE_NONE};

/// One search-stack frame. The stack is a plain pre-allocated array; frames
/// two plies ahead are re-initialized at node entry so killer slots never
/// leak across unrelated subtrees.
#[derive(Clone, Default)]
pub struct Frame {
    pub current_move: Option<ChessMove>,
    pub threat_move: Option<ChessMove>,
    /// The move made at this ply was the null move.
    pub made_null: bool,
    /// The move made at this ply was quiet (no capture, castle or
    /// promotion); gates the gains update in the child node.
    pub quiet_move: bool,
    /// Reduction applied to the move currently being searched at this ply.
    pub reduction: Depth,
    pub eval: Value,
    pub mate_killer: Option<ChessMove>,
    pub killers: [Option<ChessMove>; 2],
    /// Principal variation from this ply downward; first entry is the move
    /// played at this ply.
    pub pv: SmallVec<[ChessMove; 32]>,
}

impl Frame {
    /// Reset the per-node fields; killers are preserved on purpose.
    pub fn init(&mut self) {
        self.current_move = None;
        self.threat_move = None;
        self.made_null = false;
        self.quiet_move = false;
        self.reduction = 0;
        self.eval = VALUE_NONE;
        self.pv.clear();
    }

    pub fn init_killers(&mut self) {
        self.mate_killer = None;
        self.killers = [None; 2];
    }

    pub fn is_killer(&self, mv: ChessMove) -> bool {
        self.killers[0] == Some(mv) || self.killers[1] == Some(mv)
    }

    /// Push a cutoff move to the front of the killer slots.
    pub fn update_killers(&mut self, mv: ChessMove) {
        if self.killers[0] == Some(mv) {
            return;
        }
        self.killers[1] = self.killers[0];
        self.killers[0] = Some(mv);
    }
}

/// Allocate a fresh stack with every frame initialized.
pub fn new_stack(len: usize) -> Vec<Frame> {
    let mut stack = vec![Frame::default(); len];
    for frame in &mut stack {
        frame.init();
        frame.init_killers();
    }
    stack
}

/// Copy the child PV up to `ply` after a fail-high or an alpha improvement.
pub fn update_pv(ss: &mut [Frame], ply: usize) {
    let (head, tail) = ss.split_at_mut(ply + 1);
    let frame = &mut head[ply];
    frame.pv.clear();
    if let Some(mv) = frame.current_move {
        frame.pv.push(mv);
        frame.pv.extend(tail[0].pv.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn killers_shift() {
        let mut frame = Frame::default();
        let a = ChessMove::from_str("e2e4").unwrap();
        let b = ChessMove::from_str("d2d4").unwrap();
        frame.update_killers(a);
        frame.update_killers(b);
        assert_eq!(frame.killers, [Some(b), Some(a)]);
        assert!(frame.is_killer(a));

        // Re-inserting the head killer is a no-op.
        frame.update_killers(b);
        assert_eq!(frame.killers, [Some(b), Some(a)]);
    }

    #[test]
    fn pv_propagates_upward() {
        let mut ss = new_stack(4);
        let a = ChessMove::from_str("e2e4").unwrap();
        let b = ChessMove::from_str("e7e5").unwrap();

        ss[2].current_move = Some(b);
        update_pv(&mut ss, 2);
        ss[1].current_move = Some(a);
        update_pv(&mut ss, 1);

        assert_eq!(ss[1].pv.as_slice(), &[a, b]);
    }
}
