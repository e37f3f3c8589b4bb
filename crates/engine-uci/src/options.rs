//! UCI option table: typed storage plus the `option name ...` listing.

use engine_core::search::SearchConfig;
use engine_core::types::{Depth, ONE_PLY};

/// All recognized options with their current values. Ranges follow the
/// `print_all` listing; out-of-range values are clamped on assignment.
pub struct Options {
    pub hash_mb: usize,
    pub multi_pv: usize,
    pub ponder: bool,
    pub own_book: bool,
    pub chess960: bool,
    pub threads: usize,
    /// In plies; converted to internal depth units in `search_config`.
    pub min_split_depth: i32,
    pub max_threads_per_split_point: usize,
    pub use_sleeping_threads: bool,

    pub check_extension: [i32; 2],
    pub single_evasion_extension: [i32; 2],
    pub mate_threat_extension: [i32; 2],
    pub pawn_push_to_7th_extension: [i32; 2],
    pub passed_pawn_extension: [i32; 2],
    pub pawn_endgame_extension: [i32; 2],
    pub threat_depth: i32,

    pub futility_pruning_main: bool,
    pub futility_pruning_qs: bool,
    pub futility_margin_qs: i32,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            hash_mb: 32,
            multi_pv: 1,
            ponder: true,
            own_book: false,
            chess960: false,
            threads: 1,
            min_split_depth: 4,
            max_threads_per_split_point: 5,
            use_sleeping_threads: true,
            check_extension: [1, 2],
            single_evasion_extension: [2, 2],
            mate_threat_extension: [0, 0],
            pawn_push_to_7th_extension: [1, 1],
            passed_pawn_extension: [0, 1],
            pawn_endgame_extension: [2, 2],
            threat_depth: 5,
            futility_pruning_main: true,
            futility_pruning_qs: true,
            futility_margin_qs: 128,
        }
    }
}

impl Options {
    /// Emit the complete option listing for the `uci` handshake.
    pub fn print_all(&self) {
        println!("option name Hash type spin default 32 min 4 max 1024");
        println!("option name Clear Hash type button");
        println!("option name Ponder type check default true");
        println!("option name OwnBook type check default false");
        println!("option name MultiPV type spin default 1 min 1 max 500");
        println!("option name UCI_Chess960 type check default false");
        println!("option name Threads type spin default 1 min 1 max 32");
        println!("option name Minimum Split Depth type spin default 4 min 4 max 7");
        println!(
            "option name Maximum Number of Threads per Split Point type spin default 5 min 4 max 8"
        );
        println!("option name Use Sleeping Threads type check default true");
        println!("option name Check Extension (PV nodes) type spin default 2 min 0 max 2");
        println!("option name Check Extension (non-PV nodes) type spin default 1 min 0 max 2");
        println!("option name Single Evasion Extension (PV nodes) type spin default 2 min 0 max 2");
        println!(
            "option name Single Evasion Extension (non-PV nodes) type spin default 2 min 0 max 2"
        );
        println!("option name Mate Threat Extension (PV nodes) type spin default 0 min 0 max 2");
        println!("option name Mate Threat Extension (non-PV nodes) type spin default 0 min 0 max 2");
        println!(
            "option name Pawn Push to 7th Extension (PV nodes) type spin default 1 min 0 max 2"
        );
        println!(
            "option name Pawn Push to 7th Extension (non-PV nodes) type spin default 1 min 0 max 2"
        );
        println!("option name Passed Pawn Extension (PV nodes) type spin default 1 min 0 max 2");
        println!("option name Passed Pawn Extension (non-PV nodes) type spin default 0 min 0 max 2");
        println!("option name Pawn Endgame Extension (PV nodes) type spin default 2 min 0 max 2");
        println!(
            "option name Pawn Endgame Extension (non-PV nodes) type spin default 2 min 0 max 2"
        );
        println!("option name Threat Depth type spin default 5 min 0 max 100");
        println!("option name Futility Pruning (Main Search) type check default true");
        println!("option name Futility Pruning (Quiescence Search) type check default true");
        println!(
            "option name Futility Margin (Quiescence Search) type spin default 128 min 0 max 1000"
        );
    }

    /// Apply a plain (non-button, non-resource) option. Returns false for
    /// unknown names so the caller can print a diagnostic.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        fn spin(value: &str, min: i32, max: i32) -> Option<i32> {
            value.parse::<i32>().ok().map(|v| v.clamp(min, max))
        }
        fn check(value: &str) -> Option<bool> {
            value.parse::<bool>().ok()
        }

        match name {
            "MultiPV" => {
                if let Some(v) = spin(value, 1, 500) {
                    self.multi_pv = v as usize;
                }
            }
            "Ponder" => {
                if let Some(v) = check(value) {
                    self.ponder = v;
                }
            }
            "OwnBook" => {
                if let Some(v) = check(value) {
                    self.own_book = v;
                }
            }
            "UCI_Chess960" => {
                if let Some(v) = check(value) {
                    self.chess960 = v;
                }
            }
            "Minimum Split Depth" => {
                if let Some(v) = spin(value, 4, 7) {
                    self.min_split_depth = v;
                }
            }
            "Maximum Number of Threads per Split Point" => {
                if let Some(v) = spin(value, 4, 8) {
                    self.max_threads_per_split_point = v as usize;
                }
            }
            "Use Sleeping Threads" => {
                if let Some(v) = check(value) {
                    self.use_sleeping_threads = v;
                }
            }
            "Check Extension (PV nodes)" => {
                if let Some(v) = spin(value, 0, 2) {
                    self.check_extension[1] = v;
                }
            }
            "Check Extension (non-PV nodes)" => {
                if let Some(v) = spin(value, 0, 2) {
                    self.check_extension[0] = v;
                }
            }
            "Single Evasion Extension (PV nodes)" => {
                if let Some(v) = spin(value, 0, 2) {
                    self.single_evasion_extension[1] = v;
                }
            }
            "Single Evasion Extension (non-PV nodes)" => {
                if let Some(v) = spin(value, 0, 2) {
                    self.single_evasion_extension[0] = v;
                }
            }
            "Mate Threat Extension (PV nodes)" => {
                if let Some(v) = spin(value, 0, 2) {
                    self.mate_threat_extension[1] = v;
                }
            }
            "Mate Threat Extension (non-PV nodes)" => {
                if let Some(v) = spin(value, 0, 2) {
                    self.mate_threat_extension[0] = v;
                }
            }
            "Pawn Push to 7th Extension (PV nodes)" => {
                if let Some(v) = spin(value, 0, 2) {
                    self.pawn_push_to_7th_extension[1] = v;
                }
            }
            "Pawn Push to 7th Extension (non-PV nodes)" => {
                if let Some(v) = spin(value, 0, 2) {
                    self.pawn_push_to_7th_extension[0] = v;
                }
            }
            "Passed Pawn Extension (PV nodes)" => {
                if let Some(v) = spin(value, 0, 2) {
                    self.passed_pawn_extension[1] = v;
                }
            }
            "Passed Pawn Extension (non-PV nodes)" => {
                if let Some(v) = spin(value, 0, 2) {
                    self.passed_pawn_extension[0] = v;
                }
            }
            "Pawn Endgame Extension (PV nodes)" => {
                if let Some(v) = spin(value, 0, 2) {
                    self.pawn_endgame_extension[1] = v;
                }
            }
            "Pawn Endgame Extension (non-PV nodes)" => {
                if let Some(v) = spin(value, 0, 2) {
                    self.pawn_endgame_extension[0] = v;
                }
            }
            "Threat Depth" => {
                if let Some(v) = spin(value, 0, 100) {
                    self.threat_depth = v;
                }
            }
            "Futility Pruning (Main Search)" => {
                if let Some(v) = check(value) {
                    self.futility_pruning_main = v;
                }
            }
            "Futility Pruning (Quiescence Search)" => {
                if let Some(v) = check(value) {
                    self.futility_pruning_qs = v;
                }
            }
            "Futility Margin (Quiescence Search)" => {
                if let Some(v) = spin(value, 0, 1000) {
                    self.futility_margin_qs = v;
                }
            }
            _ => return false,
        }
        true
    }

    /// Snapshot for a `go` command.
    pub fn search_config(&self) -> SearchConfig {
        let d = |plies: i32| -> Depth { plies * ONE_PLY };
        SearchConfig {
            threads: self.threads,
            multi_pv: self.multi_pv,
            min_split_depth: d(self.min_split_depth),
            max_threads_per_split_point: self.max_threads_per_split_point,
            use_sleeping_threads: self.use_sleeping_threads,
            ponder_enabled: self.ponder,
            check_extension: self.check_extension,
            single_evasion_extension: self.single_evasion_extension,
            mate_threat_extension: self.mate_threat_extension,
            pawn_push_to_7th_extension: self.pawn_push_to_7th_extension,
            passed_pawn_extension: self.passed_pawn_extension,
            pawn_endgame_extension: self.pawn_endgame_extension,
            threat_depth: d(self.threat_depth),
            futility_pruning_main: self.futility_pruning_main,
            futility_pruning_qs: self.futility_pruning_qs,
            futility_margin_qs: self.futility_margin_qs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_option_is_rejected() {
        let mut opts = Options::default();
        assert!(!opts.set("Nonsense Knob", "1"));
    }

    #[test]
    fn spin_values_are_clamped() {
        let mut opts = Options::default();
        assert!(opts.set("MultiPV", "9999"));
        assert_eq!(opts.multi_pv, 500);
        assert!(opts.set("Minimum Split Depth", "2"));
        assert_eq!(opts.min_split_depth, 4);
    }

    #[test]
    fn config_uses_internal_depth_units() {
        let mut opts = Options::default();
        opts.set("Minimum Split Depth", "7");
        let cfg = opts.search_config();
        assert_eq!(cfg.min_split_depth, 7 * ONE_PLY);
        assert_eq!(cfg.threat_depth, 5 * ONE_PLY);
    }
}
