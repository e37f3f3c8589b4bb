//! Root move list, root search with aspiration windows, and the iterative
//! deepening driver.

use chess::ChessMove;
use std::sync::atomic::Ordering;

use super::node::{qsearch, search, SearchEnv};
use super::{extension, uci_score, update_pv, EASY_MOVE_MARGIN, PROBLEM_MARGIN};
use crate::eval::evaluate;
use crate::position::Position;
use crate::threads::WorkerLocals;
use crate::types::{
    Value, ONE_PLY, PLY_MAX, VALUE_DRAW, VALUE_INFINITE, VALUE_KNOWN_WIN, VALUE_MATE,
};

/// Final result of one `go` command.
#[derive(Clone, Debug)]
pub struct SearchReport {
    pub best_move: Option<ChessMove>,
    pub ponder: Option<ChessMove>,
    pub score: Value,
    pub depth: i32,
    pub nodes: u64,
}

struct RootMove {
    mv: ChessMove,
    score: Value,
    nodes: u64,
    cumulative_nodes: u64,
    their_beta: u64,
    pv: Vec<ChessMove>,
}

struct RootMoveList {
    moves: Vec<RootMove>,
}

impl RootMoveList {
    /// Generate, filter against `searchmoves`, score each move with a
    /// shallow quiescence search and sort best-first.
    fn new(env: SearchEnv, locals: &mut WorkerLocals, pos: &mut Position) -> Self {
        let restrict = &env.ctx.limits.searchmoves;
        let mut moves = Vec::new();

        for mv in pos.legal_moves() {
            if !restrict.is_empty() && !restrict.contains(&mv) {
                continue;
            }
            pos.do_move(mv);
            let score = -qsearch::<true>(
                env,
                locals,
                pos,
                -VALUE_INFINITE,
                VALUE_INFINITE,
                0,
                1,
            );
            pos.undo_move();
            moves.push(RootMove {
                mv,
                score,
                nodes: 0,
                cumulative_nodes: 0,
                their_beta: 0,
                pv: vec![mv],
            });
        }

        let mut rml = RootMoveList { moves };
        rml.sort();
        rml
    }

    fn sort(&mut self) {
        let n = self.moves.len();
        self.sort_multipv(n.saturating_sub(1));
    }

    /// Stable insertion sort of `0..=n` by score, beta-cutoff counters as
    /// the tiebreak; mirrors the re-sort between iterations.
    fn sort_multipv(&mut self, n: usize) {
        for i in 1..=n.min(self.moves.len().saturating_sub(1)) {
            let mut j = i;
            while j > 0 && {
                let a = &self.moves[j - 1];
                let b = &self.moves[j];
                a.score < b.score || (a.score == b.score && b.their_beta > a.their_beta)
            } {
                self.moves.swap(j - 1, j);
                j -= 1;
            }
        }
    }
}

/// The iterative deepening loop: repeated root searches with an aspiration
/// window, PV re-insertion, and the time-management stop rules.
pub(crate) fn id_loop(env: SearchEnv, locals: &mut WorkerLocals, pos: &mut Position) -> SearchReport {
    let ctx = env.ctx;

    ctx.tt.new_search();
    ctx.history.clear();
    for frame in locals.ss.iter_mut() {
        frame.init();
        frame.init_killers();
    }
    locals.nodes_since_poll = 0;
    locals.last_info_ms = 0;

    let mut rml = RootMoveList::new(env, locals, pos);

    // Mate or stalemate at the root.
    if rml.moves.is_empty() {
        wait_if_pondering(env);
        let score = if pos.in_check() { -VALUE_MATE } else { VALUE_DRAW };
        return SearchReport {
            best_move: None,
            ponder: None,
            score,
            depth: 0,
            nodes: env.pool.nodes_searched(),
        };
    }

    // The game is already drawn by rule; any move keeps the half point.
    if pos.is_game_draw() {
        (ctx.info)(&format!(
            "info depth 1 score {} nodes {} pv {}",
            uci_score(VALUE_DRAW),
            env.pool.nodes_searched(),
            rml.moves[0].mv
        ));
        wait_if_pondering(env);
        return SearchReport {
            best_move: Some(rml.moves[0].mv),
            ponder: None,
            score: VALUE_DRAW,
            depth: 1,
            nodes: env.pool.nodes_searched(),
        };
    }

    (ctx.info)(&format!(
        "info depth 1 score {} time {} nodes {} nps 0 pv {}",
        uci_score(rml.moves[0].score),
        ctx.time.elapsed_ms(),
        env.pool.nodes_searched(),
        rml.moves[0].mv
    ));

    let mut value_by_iteration = [VALUE_DRAW; PLY_MAX + 2];
    value_by_iteration[1] = rml.moves[0].score;
    let mut best_move_changes = [0u32; PLY_MAX + 2];

    let mut easy_move = if rml.moves.len() == 1
        || rml.moves[0].score > rml.moves[1].score + EASY_MOVE_MARGIN
    {
        Some(rml.moves[0].mv)
    } else {
        None
    };

    let mut iteration = 1usize;
    let mut aspiration_delta = 0;

    while iteration < PLY_MAX {
        rml.sort();
        iteration += 1;
        ctx.iteration.store(iteration as i32, Ordering::Relaxed);
        if iteration <= 5 {
            ctx.extra_time.store(0, Ordering::Relaxed);
        }

        (ctx.info)(&format!("info depth {iteration}"));

        let (alpha, beta) = if ctx.config.multi_pv == 1
            && iteration >= 6
            && value_by_iteration[iteration - 1].abs() < VALUE_KNOWN_WIN
        {
            let d1 = (value_by_iteration[iteration - 1] - value_by_iteration[iteration - 2]).abs();
            let d2 = (value_by_iteration[iteration - 2] - value_by_iteration[iteration - 3]).abs();
            aspiration_delta = (d1 + d2 / 2).max(16);
            aspiration_delta = (aspiration_delta + 7) / 8 * 8;
            (
                (value_by_iteration[iteration - 1] - aspiration_delta).max(-VALUE_INFINITE),
                (value_by_iteration[iteration - 1] + aspiration_delta).min(VALUE_INFINITE),
            )
        } else {
            (-VALUE_INFINITE, VALUE_INFINITE)
        };

        let value = root_search(
            env,
            locals,
            pos,
            &mut rml,
            alpha,
            beta,
            aspiration_delta,
            iteration,
            &value_by_iteration,
            &mut best_move_changes,
        );

        // Re-insert the PV so the line survives table churn.
        if let Some(first) = rml.moves.first() {
            ctx.tt.insert_pv(pos, &first.pv);
        }

        if ctx.aborted() {
            break;
        }

        value_by_iteration[iteration] = value;

        let current_best = rml
            .moves
            .iter()
            .max_by_key(|m| m.score)
            .map(|m| m.mv);
        if easy_move != current_best {
            easy_move = None;
        }

        if ctx.limits.use_time_management() {
            let mut stop_search = false;

            // A single reply needs no deep confirmation.
            if iteration >= 6 && rml.moves.len() == 1 {
                stop_search = true;
            }

            // Two consecutive mate scores settle the game.
            if iteration >= 6
                && value_by_iteration[iteration].abs() >= VALUE_MATE - 100
                && value_by_iteration[iteration - 1].abs() >= VALUE_MATE - 100
            {
                stop_search = true;
            }

            // An easy move hoarding almost all nodes can be played at once.
            let total_nodes = env.pool.nodes_searched();
            let elapsed = ctx.time.elapsed_ms();
            let optimum = ctx.allocation.optimum;
            if iteration >= 8
                && easy_move.is_some()
                && easy_move == current_best
                && rml.moves.first().map(|m| {
                    (m.cumulative_nodes > total_nodes * 85 / 100 && elapsed > optimum / 16)
                        || (m.cumulative_nodes > total_nodes * 98 / 100 && elapsed > optimum / 32)
                }) == Some(true)
            {
                stop_search = true;
            }

            // Grant extra time when the best move keeps flipping.
            if iteration > 5 && iteration <= 50 {
                ctx.extra_time.store(
                    best_move_changes[iteration] as i64 * (optimum / 2)
                        + best_move_changes[iteration - 1] as i64 * (optimum / 3),
                    Ordering::Relaxed,
                );
            }

            // Most of the target consumed: the next iteration would not
            // finish its first move anyway.
            if elapsed > (optimum + ctx.extra_time.load(Ordering::Relaxed)) * 80 / 128 {
                stop_search = true;
            }

            if stop_search {
                if ctx.signals.ponder.load(Ordering::Relaxed) {
                    ctx.signals.stop_on_ponderhit.store(true, Ordering::Relaxed);
                } else {
                    break;
                }
            }
        }

        if ctx.limits.depth > 0 && iteration as i32 >= ctx.limits.depth {
            break;
        }
    }

    rml.sort();

    // While pondering or in infinite mode the best move may not be
    // announced until the controller releases the search.
    if !ctx.aborted()
        && (ctx.signals.ponder.load(Ordering::Relaxed) || ctx.limits.infinite)
    {
        wait_if_pondering(env);
    }

    let nodes = env.pool.nodes_searched();
    let elapsed = ctx.time.elapsed_ms().max(1);
    (ctx.info)(&format!(
        "info nodes {nodes} nps {} time {elapsed} hashfull {}",
        nodes * 1000 / elapsed as u64,
        ctx.tt.full()
    ));

    let best = &rml.moves[0];
    SearchReport {
        best_move: Some(best.mv),
        ponder: best.pv.get(1).copied(),
        score: best.score,
        depth: iteration as i32,
        nodes,
    }
}

/// Block until the controller releases a ponder / infinite search. `stop`
/// aborts outright; `ponderhit` clears the ponder flag and lets the result
/// be announced.
fn wait_if_pondering(env: SearchEnv) {
    let ctx = env.ctx;
    let was_pondering = ctx.signals.ponder.load(Ordering::Relaxed);
    loop {
        if ctx.aborted() {
            break;
        }
        if was_pondering && !ctx.signals.ponder.load(Ordering::Relaxed) {
            break;
        }
        if !was_pondering && !ctx.limits.infinite {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
}

/// Search the root moves at the current iteration depth, handling aspiration
/// fail-highs per move and fail-lows over the whole list.
#[allow(clippy::too_many_arguments)]
fn root_search(
    env: SearchEnv,
    locals: &mut WorkerLocals,
    pos: &mut Position,
    rml: &mut RootMoveList,
    mut alpha: Value,
    mut beta: Value,
    aspiration_delta: Value,
    iteration: usize,
    value_by_iteration: &[Value],
    best_move_changes: &mut [u32],
) -> Value {
    let ctx = env.ctx;
    let multi_pv = ctx.config.multi_pv;
    let mut research_count = 0u32;
    let mut old_alpha = alpha;

    locals.ss[0].init();
    if !pos.in_check() {
        locals.ss[0].eval = evaluate(pos, &mut locals.caches);
    }

    'fail_low: loop {
        let mut i = 0;
        while i < rml.moves.len() && !ctx.aborted() {
            if alpha >= beta {
                // Failed high: skip the tail, a re-search with a wider
                // window follows at the next turn of the outer loop.
                rml.moves[i].score = -VALUE_INFINITE;
                i += 1;
                continue;
            }

            ctx.root_move_number.store(i + 1, Ordering::Relaxed);
            let nodes_before = env.pool.nodes_searched();
            env.pool.clear_beta_counters();

            let mv = rml.moves[i].mv;
            locals.ss[0].current_move = Some(mv);
            locals.ss[0].quiet_move =
                !pos.is_capture_or_promotion(mv) && !pos.is_castle(mv);

            if ctx.time.elapsed_ms() >= 1000 {
                (ctx.info)(&format!("info currmove {mv} currmovenumber {}", i + 1));
            }

            let gives_check = pos.gives_check(mv);
            let capture_or_promotion = pos.is_capture_or_promotion(mv);
            let is_castle_mv = pos.is_castle(mv);
            let depth = (iteration as i32 - 2) * ONE_PLY + ONE_PLY;
            let (ext, dangerous) = extension(
                &ctx.config,
                pos,
                mv,
                true,
                capture_or_promotion,
                gives_check,
                false,
                false,
            );
            let new_depth = depth + ext;

            let mut value = -VALUE_INFINITE;

            'fail_high: loop {
                pos.do_move(mv);

                if i < multi_pv || value > alpha {
                    if multi_pv > 1 {
                        alpha = -VALUE_INFINITE;
                    }
                    value = -search::<true>(env, locals, pos, -beta, -alpha, new_depth, 1, true, None);

                    // A score collapse means trouble: keep thinking on a
                    // ponderhit instead of answering instantly.
                    if iteration >= 2
                        && value <= value_by_iteration[iteration - 1] - PROBLEM_MARGIN
                    {
                        ctx.signals.stop_on_ponderhit.store(false, Ordering::Relaxed);
                    }
                } else {
                    let mut do_full_depth_search = true;

                    if depth >= 3 * ONE_PLY && !dangerous && !capture_or_promotion && !is_castle_mv
                    {
                        let move_number = (i + 1).saturating_sub(multi_pv) as u32 + 1;
                        let r = ctx.reductions.pv(depth, move_number);
                        if r > 0 {
                            locals.ss[0].reduction = r;
                            value = -search::<false>(
                                env,
                                locals,
                                pos,
                                -alpha - 1,
                                -alpha,
                                new_depth - r,
                                1,
                                true,
                                None,
                            );
                            do_full_depth_search = value > alpha;
                        }
                    }

                    if do_full_depth_search {
                        locals.ss[0].reduction = 0;
                        value = -search::<false>(
                            env,
                            locals,
                            pos,
                            -alpha - 1,
                            -alpha,
                            new_depth,
                            1,
                            true,
                            None,
                        );
                        if value > alpha {
                            value = -search::<true>(
                                env,
                                locals,
                                pos,
                                -beta,
                                -alpha,
                                new_depth,
                                1,
                                true,
                                None,
                            );
                        }
                    }
                }

                pos.undo_move();

                if ctx.aborted() || value < beta {
                    break 'fail_high;
                }

                // Failing high: commit the score before re-searching in case
                // time runs out mid re-search.
                rml.moves[i].score = value;
                update_pv(&mut locals.ss, 0);
                rml.moves[i].pv = locals.ss[0].pv.to_vec();
                emit_pv_info(env, iteration, value, alpha, beta, &rml.moves[i].pv);

                research_count += 1;
                beta = (beta + aspiration_delta * (1 << research_count)).min(VALUE_INFINITE);
            }

            if ctx.aborted() {
                break;
            }

            let (_our, their) = env.pool.read_beta_counters(pos.side_to_move());
            rml.moves[i].their_beta = their;
            let searched = env.pool.nodes_searched() - nodes_before;
            rml.moves[i].nodes = searched;
            rml.moves[i].cumulative_nodes += searched;

            if value <= alpha && i >= multi_pv {
                rml.moves[i].score = -VALUE_INFINITE;
            } else {
                // PV move or a new best move.
                rml.moves[i].score = value;
                update_pv(&mut locals.ss, 0);
                rml.moves[i].pv = locals.ss[0].pv.to_vec();
                if rml.moves[i].pv.len() < 2 {
                    rml.moves[i].pv = ctx.tt.extract_pv(pos, mv, PLY_MAX);
                }

                if multi_pv == 1 {
                    if i > 0 {
                        best_move_changes[iteration] += 1;
                    }
                    emit_pv_info(env, iteration, value, alpha, beta, &rml.moves[i].pv);
                    if value > alpha {
                        alpha = value;
                    }
                } else {
                    rml.sort_multipv(i);
                    for (j, line) in rml.moves.iter().take(multi_pv).enumerate() {
                        let d = if j <= i { iteration } else { iteration - 1 };
                        let pv_str = line
                            .pv
                            .iter()
                            .map(|m| m.to_string())
                            .collect::<Vec<_>>()
                            .join(" ");
                        (ctx.info)(&format!(
                            "info multipv {} score {} depth {} time {} nodes {} nps 0 pv {}",
                            j + 1,
                            uci_score(line.score),
                            d,
                            ctx.time.elapsed_ms(),
                            env.pool.nodes_searched(),
                            pv_str
                        ));
                    }
                    alpha = rml.moves[i.min(multi_pv - 1)].score;
                }
            }

            ctx.signals
                .failed_low_at_root
                .store(alpha == old_alpha, Ordering::Relaxed);
            i += 1;
        }

        if ctx.aborted() || alpha > old_alpha {
            break 'fail_low;
        }

        // Failed low at the root: widen downward and start over.
        research_count += 1;
        alpha = (alpha - aspiration_delta * (1 << research_count)).max(-VALUE_INFINITE);
        old_alpha = alpha;
    }

    alpha
}

fn emit_pv_info(
    env: SearchEnv,
    iteration: usize,
    value: Value,
    alpha: Value,
    beta: Value,
    pv: &[ChessMove],
) {
    let ctx = env.ctx;
    let bound = if value >= beta {
        " lowerbound"
    } else if value <= alpha {
        " upperbound"
    } else {
        ""
    };
    let elapsed = ctx.time.elapsed_ms();
    let nodes = env.pool.nodes_searched();
    let nps = if elapsed > 0 { nodes * 1000 / elapsed as u64 } else { 0 };
    let pv_str = pv.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(" ");
    (ctx.info)(&format!(
        "info depth {iteration} score {}{bound} time {elapsed} nodes {nodes} nps {nps} pv {pv_str}",
        uci_score(value)
    ));
}
