//! End-to-end search tests driving `think` directly.

use chess::ChessMove;
use std::str::FromStr;
use std::sync::Arc;

use engine_core::history::History;
use engine_core::search::{think, LimitsType, SearchConfig, SearchContext, SearchReport};
use engine_core::threads::ThreadPool;
use engine_core::tt::TranspositionTable;
use engine_core::types::{mate_in, VALUE_DRAW, VALUE_MATE};
use engine_core::Position;

fn run_search(pos: &mut Position, limits: LimitsType, config: SearchConfig) -> SearchReport {
    let pool = ThreadPool::new();
    pool.set_active_threads(config.threads);
    let tt = Arc::new(TranspositionTable::new(16));
    let history = Arc::new(History::new());
    let ctx = SearchContext::new(
        tt,
        history,
        config,
        limits,
        pos,
        Arc::new(|_line: &str| {}),
    );
    let report = think(&pool, &ctx, pos);
    pool.shutdown();
    report
}

fn depth_limits(depth: i32) -> LimitsType {
    LimitsType {
        depth,
        ..Default::default()
    }
}

#[test]
fn finds_mate_in_one() {
    let mut pos = Position::from_fen("4k3/8/4K3/8/8/8/8/4Q3 w - - 0 1").unwrap();
    let report = run_search(&mut pos, depth_limits(2), SearchConfig::default());

    assert_eq!(report.score, mate_in(1));
    let best = report.best_move.expect("a mating move");
    pos.do_move(best);
    assert!(pos.is_mate(), "move {best} does not mate");
}

#[test]
fn stalemate_root_reports_draw() {
    let mut pos = Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
    let report = run_search(&mut pos, depth_limits(4), SearchConfig::default());

    assert_eq!(report.best_move, None);
    assert_eq!(report.score, VALUE_DRAW);
}

#[test]
fn mated_root_reports_mate_score() {
    // Back-rank mate already delivered; black to move has no reply.
    let mut pos = Position::from_fen("R5k1/5ppp/8/8/8/8/8/4K3 b - - 0 1").unwrap();
    assert!(pos.in_check());
    let report = run_search(&mut pos, depth_limits(3), SearchConfig::default());
    assert_eq!(report.best_move, None);
    assert_eq!(report.score, -VALUE_MATE);
}

#[test]
fn threefold_repetition_scores_zero() {
    let mut pos = Position::startpos();
    for uci in [
        "d2d4", "d7d5", "b1c3", "b8c6", "c3b1", "c6b8", "b1c3", "b8c6", "c3b1", "c6b8",
    ] {
        let mv = ChessMove::from_str(uci).unwrap();
        assert!(pos.is_legal(mv), "preamble move {uci} illegal");
        pos.do_move(mv);
    }

    let report = run_search(&mut pos, depth_limits(10), SearchConfig::default());
    assert_eq!(report.score, VALUE_DRAW);
    assert!(report.best_move.is_some());
}

#[test]
fn deeper_search_still_finds_the_mate() {
    let mut pos = Position::from_fen("4k3/8/4K3/8/8/8/8/4Q3 w - - 0 1").unwrap();
    let report = run_search(&mut pos, depth_limits(6), SearchConfig::default());
    assert_eq!(report.score, mate_in(1));
}

#[test]
fn returns_a_legal_move_from_the_startpos() {
    let mut pos = Position::startpos();
    let report = run_search(&mut pos, depth_limits(5), SearchConfig::default());
    let best = report.best_move.expect("some move");
    assert!(pos.is_legal(best));
    assert!(report.nodes > 0);
    assert!(report.score.abs() < 200, "startpos score implausible: {}", report.score);
}

#[test]
fn parallel_search_completes_and_agrees_on_sign() {
    let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 0 1";

    let mut pos = Position::from_fen(fen).unwrap();
    let serial = run_search(&mut pos, depth_limits(6), SearchConfig::default());

    let config = SearchConfig {
        threads: 2,
        ..Default::default()
    };
    let mut pos = Position::from_fen(fen).unwrap();
    let parallel = run_search(&mut pos, depth_limits(6), config);

    let best = parallel.best_move.expect("parallel search returns a move");
    assert!(pos.is_legal(best));
    // Search order is timing dependent, but a quiet equal-ish position must
    // not swing between winning and losing with the thread count.
    assert!(
        (serial.score - parallel.score).abs() < 300,
        "serial {} vs parallel {}",
        serial.score,
        parallel.score
    );
}

#[test]
fn searchmoves_restricts_the_root() {
    let mut pos = Position::startpos();
    let only = ChessMove::from_str("a2a3").unwrap();
    let limits = LimitsType {
        depth: 4,
        searchmoves: vec![only],
        ..Default::default()
    };
    let report = run_search(&mut pos, limits, SearchConfig::default());
    assert_eq!(report.best_move, Some(only));
}

#[test]
fn node_limit_stops_the_search() {
    let mut pos = Position::startpos();
    let limits = LimitsType {
        nodes: 20_000,
        ..Default::default()
    };
    let report = run_search(&mut pos, limits, SearchConfig::default());
    assert!(report.best_move.is_some());
    // The budget is polled, not exact; allow generous slack.
    assert!(report.nodes < 400_000, "searched {} nodes", report.nodes);
}
