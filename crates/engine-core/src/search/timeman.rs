//! Thinking-time allocation.
//!
//! Two budgets per move: a target (`optimum`) the iterative deepening loop
//! aims for, and a hard ceiling (`maximum`) enforced by the timer thread.
//! Best-move instability grants extra time on top of the target.

use chess::Color;

use super::limits::LimitsType;

#[derive(Clone, Copy, Debug, Default)]
pub struct TimeAllocation {
    /// Soft target in milliseconds.
    pub optimum: i64,
    /// Hard ceiling in milliseconds.
    pub maximum: i64,
}

/// Compute the allocation for `us` from the clock fields of `limits`.
/// A zero allocation means time management is off.
pub fn allocate(limits: &LimitsType, us: Color, ponder_enabled: bool) -> TimeAllocation {
    if !limits.use_time_management() {
        return TimeAllocation::default();
    }

    let my_time = limits.time[us as usize].max(0);
    let my_inc = limits.inc[us as usize].max(0);

    let (mut optimum, maximum) = if limits.movestogo == 0 {
        // Sudden death, with or without increment.
        if my_inc > 0 {
            (
                my_time / 30 + my_inc,
                (my_time / 4).max(my_inc - 100),
            )
        } else {
            (my_time / 30, my_time / 8)
        }
    } else if limits.movestogo == 1 {
        // Last move before the time control: leave a safety margin.
        (
            my_time / 2,
            if my_time > 3000 { my_time - 500 } else { my_time * 3 / 4 },
        )
    } else {
        (
            my_time / limits.movestogo.min(20),
            (4 * my_time / limits.movestogo).min(my_time / 3),
        )
    };

    if ponder_enabled {
        optimum += optimum / 4;
        optimum = optimum.min(maximum);
    }

    TimeAllocation {
        optimum: optimum.max(0),
        maximum: maximum.max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(time: i64, inc: i64, movestogo: i64) -> LimitsType {
        LimitsType {
            time: [time, time],
            inc: [inc, inc],
            movestogo,
            ..Default::default()
        }
    }

    #[test]
    fn sudden_death_budgets_a_fraction() {
        let alloc = allocate(&clock(60_000, 0, 0), Color::White, false);
        assert_eq!(alloc.optimum, 2_000);
        assert_eq!(alloc.maximum, 7_500);
    }

    #[test]
    fn increment_extends_the_target() {
        let alloc = allocate(&clock(60_000, 1_000, 0), Color::White, false);
        assert_eq!(alloc.optimum, 3_000);
        assert_eq!(alloc.maximum, 15_000);
    }

    #[test]
    fn repeating_control_divides_by_moves() {
        let alloc = allocate(&clock(60_000, 0, 40), Color::White, false);
        assert_eq!(alloc.optimum, 3_000);
        assert_eq!(alloc.maximum, 6_000);
    }

    #[test]
    fn last_move_keeps_a_margin() {
        let alloc = allocate(&clock(10_000, 0, 1), Color::White, false);
        assert_eq!(alloc.optimum, 5_000);
        assert_eq!(alloc.maximum, 9_500);
    }

    #[test]
    fn fixed_movetime_disables_allocation() {
        let mut limits = clock(60_000, 0, 0);
        limits.movetime = 500;
        let alloc = allocate(&limits, Color::White, false);
        assert_eq!(alloc.optimum, 0);
        assert_eq!(alloc.maximum, 0);
    }

    #[test]
    fn ponder_adds_a_quarter() {
        let without = allocate(&clock(60_000, 0, 0), Color::White, false);
        let with = allocate(&clock(60_000, 0, 0), Color::White, true);
        assert_eq!(with.optimum, without.optimum + without.optimum / 4);
    }
}
