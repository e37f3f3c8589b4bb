//! Criterion micro-benchmarks for the hot paths: evaluation, move picking
//! and a fixed-depth search from the start position.

use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use engine_core::eval::{evaluate, EvalCaches};
use engine_core::history::History;
use engine_core::movepick::MovePicker;
use engine_core::search::{LimitsType, SearchConfig, SearchContext};
use engine_core::threads::ThreadPool;
use engine_core::tt::TranspositionTable;
use engine_core::types::ONE_PLY;
use engine_core::Position;

fn bench_evaluate(c: &mut Criterion) {
    let pos = Position::startpos();
    let mut caches = EvalCaches::default();
    c.bench_function("evaluate_startpos", |b| {
        b.iter(|| evaluate(&pos, &mut caches))
    });
}

fn bench_movepick(c: &mut Criterion) {
    let pos = Position::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    )
    .unwrap();
    let history = Arc::new(History::new());
    c.bench_function("movepick_drain", |b| {
        b.iter(|| {
            let mut picker =
                MovePicker::new(&pos, None, 6 * ONE_PLY, history.clone(), [None; 2], None);
            let mut count = 0;
            while picker.next_move().is_some() {
                count += 1;
            }
            count
        })
    });
}

fn bench_fixed_depth_search(c: &mut Criterion) {
    let pool = ThreadPool::new();
    let tt = Arc::new(TranspositionTable::new(16));
    let history = Arc::new(History::new());

    c.bench_function("search_depth_5_startpos", |b| {
        b.iter(|| {
            tt.clear();
            let mut pos = Position::startpos();
            let limits = LimitsType {
                depth: 5,
                ..Default::default()
            };
            let ctx = SearchContext::new(
                tt.clone(),
                history.clone(),
                SearchConfig::default(),
                limits,
                &pos,
                Arc::new(|_line: &str| {}),
            );
            engine_core::search::think(&pool, &ctx, &mut pos)
        })
    });

    pool.shutdown();
}

criterion_group!(benches, bench_evaluate, bench_movepick, bench_fixed_depth_search);
criterion_main!(benches);
