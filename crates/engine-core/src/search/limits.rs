//! Search limits parsed from a `go` command.

use chess::ChessMove;

/// Everything a `go` command can constrain. Times are milliseconds.
#[derive(Clone, Debug, Default)]
pub struct LimitsType {
    /// Remaining clock per side, indexed by `Color as usize`.
    pub time: [i64; 2],
    /// Increment per side.
    pub inc: [i64; 2],
    pub movestogo: i64,
    pub depth: i32,
    pub nodes: u64,
    pub movetime: i64,
    pub infinite: bool,
    pub ponder: bool,
    /// Restrict the root to this subset when non-empty.
    pub searchmoves: Vec<ChessMove>,
}

impl LimitsType {
    /// Clock-driven allocation applies only when no explicit constraint
    /// pins the search down.
    pub fn use_time_management(&self) -> bool {
        self.movetime == 0 && self.depth == 0 && self.nodes == 0 && !self.infinite
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_limits_disable_time_management() {
        let limits = LimitsType {
            time: [60_000, 60_000],
            ..Default::default()
        };
        assert!(limits.use_time_management());

        let fixed = LimitsType {
            movetime: 500,
            ..Default::default()
        };
        assert!(!fixed.use_time_management());

        let depth = LimitsType {
            depth: 8,
            ..Default::default()
        };
        assert!(!depth.use_time_management());

        let infinite = LimitsType {
            infinite: true,
            ..Default::default()
        };
        assert!(!infinite.use_time_management());
    }
}
