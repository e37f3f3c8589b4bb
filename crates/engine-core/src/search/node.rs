//! Node search: principal-variation and zero-window alpha-beta, quiescence,
//! and the slave loop executed at split points.
//!
//! Cancellation is cooperative: abort, per-worker stop and split-point
//! `finished` flags are polled at node entry and after every unmake, and the
//! search unwinds with sentinel values that are never committed to the TT.

use chess::{CastleRights, ChessMove};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::{
    connected_moves, extension, futility_margin, futility_move_count, ok_to_prune, ok_to_use_tt,
    refine_eval, update_gains, update_history, update_pv, SearchContext, IID_MARGIN,
    NULL_MOVE_MARGIN, RAZOR_DEPTH, SELECTIVE_DEPTH, SINGLE_REPLY_MARGIN,
};
use crate::eval::evaluate;
use crate::movepick::MovePicker;
use crate::position::Position;
use crate::threads::{split, SplitPoint, ThreadPool, WorkerLocals};
use crate::types::{
    mate_in, mated_in, value_from_tt, value_is_mate, value_to_tt, Bound, Depth, Value,
    DEPTH_NONE, DEPTH_ZERO, ONE_PLY, PAWN_VALUE_ENDGAME, PAWN_VALUE_MIDGAME, PLY_MAX,
    ROOK_VALUE_MIDGAME, VALUE_DRAW, VALUE_INFINITE, VALUE_KNOWN_WIN, VALUE_NONE,
};

/// Shared references threaded through the recursion.
#[derive(Clone, Copy)]
pub(crate) struct SearchEnv<'a> {
    pub ctx: &'a Arc<SearchContext>,
    pub pool: &'a Arc<ThreadPool>,
}

/// Node entry bookkeeping: bump the node counter, poll on the main worker,
/// reset this ply's frame and the killer slots two plies ahead.
fn init_node(env: SearchEnv, locals: &mut WorkerLocals, ply: usize) {
    env.pool.worker(locals.id).nodes.fetch_add(1, Ordering::Relaxed);

    if locals.id == 0 {
        locals.nodes_since_poll += 1;
        if locals.nodes_since_poll >= env.ctx.nodes_between_polls {
            locals.nodes_since_poll = 0;
            poll(env, locals);
        }
    }

    locals.ss[ply].init();
    locals.ss[ply + 2].init_killers();
}

/// Time / node-budget checks plus the periodic status line. Runs only on the
/// main worker; the timer thread covers the time checks when this worker is
/// buried in a long subtree.
fn poll(env: SearchEnv, locals: &mut WorkerLocals) {
    let ctx = env.ctx;
    let t = ctx.time.elapsed_ms();

    if t >= 1000 && t - locals.last_info_ms >= 1000 {
        locals.last_info_ms = t;
        let nodes = env.pool.nodes_searched();
        let nps = if t > 0 { nodes * 1000 / t as u64 } else { 0 };
        (ctx.info)(&format!(
            "info nodes {nodes} nps {nps} time {t} hashfull {}",
            ctx.tt.full()
        ));
    }

    ctx.check_stop_conditions(env.pool.nodes_searched());
}

#[inline]
fn stopped(env: SearchEnv, id: usize) -> bool {
    env.ctx.aborted() || env.pool.thread_should_stop(id)
}

/// Main search, one body for both instantiations: `PV` nodes carry a real
/// window, non-PV nodes a zero-width one (`beta - alpha == 1`).
#[allow(clippy::too_many_arguments)]
pub(crate) fn search<const PV: bool>(
    env: SearchEnv,
    locals: &mut WorkerLocals,
    pos: &mut Position,
    mut alpha: Value,
    mut beta: Value,
    depth: Depth,
    ply: usize,
    allow_null: bool,
    excluded: Option<ChessMove>,
) -> Value {
    debug_assert!(PV || beta - alpha == 1);

    if depth < ONE_PLY {
        return qsearch::<PV>(env, locals, pos, alpha, beta, DEPTH_ZERO, ply);
    }

    init_node(env, locals, ply);
    if stopped(env, locals.id) {
        return VALUE_DRAW;
    }

    if pos.is_draw() || ply >= PLY_MAX - 1 {
        return VALUE_DRAW;
    }

    // Mate distance pruning.
    let old_alpha = alpha;
    alpha = alpha.max(mated_in(ply));
    beta = beta.min(mate_in(ply + 1));
    if alpha >= beta {
        return if PV { alpha } else { beta };
    }

    // A partial search with an excluded move must not pollute the full
    // entry for this position.
    let key = match excluded {
        Some(mv) => pos.exclusion_key(mv),
        None => pos.key(),
    };

    let mut tte = env.ctx.tt.retrieve(key);
    let mut tt_move = tte.and_then(|e| e.mv);

    if !PV {
        if let Some(e) = &tte {
            if ok_to_use_tt(e, depth, beta, ply) {
                locals.ss[ply].current_move = e.mv;
                return value_from_tt(e.value, ply);
            }
        }
    }

    let is_check = pos.in_check();

    // Static evaluation, refined by a TT bound pointing the right way.
    let mut static_value = VALUE_NONE;
    let mut futility_value = VALUE_NONE;
    if !is_check {
        static_value = match &tte {
            Some(e) if e.bound.is_eval() => value_from_tt(e.value, ply),
            _ => evaluate(pos, &mut locals.caches),
        };
        locals.ss[ply].eval = static_value;
        futility_value = static_value + futility_margin(depth);
        static_value = refine_eval(tte.as_ref(), static_value, ply);

        if ply > 0 {
            let prev = &locals.ss[ply - 1];
            update_gains(
                &env.ctx.history,
                pos,
                prev.current_move,
                prev.quiet_move,
                prev.eval,
                locals.ss[ply].eval,
            );
        }
    }

    let mut mate_threat = false;

    if !PV {
        // Static null move (reverse futility).
        if !is_check
            && allow_null
            && depth < RAZOR_DEPTH
            && static_value - futility_margin(depth) >= beta
        {
            return static_value - futility_margin(depth);
        }

        // Null move search with zugzwang verification.
        if allow_null
            && depth > ONE_PLY
            && !is_check
            && !value_is_mate(beta)
            && crate::eval::has_non_pawn_material(pos, pos.side_to_move())
            && static_value >= beta - NULL_MOVE_MARGIN
        {
            locals.ss[ply].current_move = None;
            locals.ss[ply].made_null = true;

            if pos.do_null_move() {
                let mut r = 3 + if depth >= 5 * ONE_PLY { depth / 8 } else { 0 };
                if static_value - beta > PAWN_VALUE_MIDGAME {
                    r += 1;
                }

                let null_value = -search::<false>(
                    env,
                    locals,
                    pos,
                    -beta,
                    -(beta - 1),
                    depth - r * ONE_PLY,
                    ply + 1,
                    false,
                    None,
                );
                pos.undo_null_move();
                locals.ss[ply].made_null = false;

                if stopped(env, locals.id) {
                    return VALUE_DRAW;
                }

                if null_value >= beta {
                    if depth < 6 * ONE_PLY {
                        return beta;
                    }
                    // Zugzwang verification at reduced depth, same ply.
                    let v = search::<false>(
                        env,
                        locals,
                        pos,
                        beta - 1,
                        beta,
                        depth - 5 * ONE_PLY,
                        ply,
                        false,
                        None,
                    );
                    if v >= beta {
                        return beta;
                    }
                } else {
                    // The refutation of the null move is a threat; a reduced
                    // previous move connected to it fails low right away so
                    // the parent re-searches at full depth.
                    if null_value == mated_in(ply + 2) {
                        mate_threat = true;
                    }
                    let threat = locals.ss[ply + 1].current_move;
                    locals.ss[ply].threat_move = threat;
                    if depth < env.ctx.config.threat_depth
                        && ply > 0
                        && locals.ss[ply - 1].reduction > 0
                        && locals.ss[ply - 1]
                            .current_move
                            .map(|m1| threat.map(|t| connected_moves(pos, m1, t)).unwrap_or(false))
                            .unwrap_or(false)
                    {
                        return beta - 1;
                    }
                }
            } else {
                locals.ss[ply].made_null = false;
            }
        }
        // Razoring: drop straight into quiescence when even a large margin
        // cannot reach beta.
        else if !value_is_mate(beta)
            && !is_check
            && depth < RAZOR_DEPTH
            && static_value < beta - (NULL_MOVE_MARGIN + 16 * depth)
            && (ply == 0 || !locals.ss[ply - 1].made_null)
            && tt_move.is_none()
            && !pos.has_pawn_on_7th(pos.side_to_move())
        {
            let rbeta = beta - (NULL_MOVE_MARGIN + 16 * depth);
            let v = qsearch::<false>(env, locals, pos, rbeta - 1, rbeta, DEPTH_ZERO, ply);
            if v < rbeta {
                return v;
            }
        }
    }

    // Internal iterative deepening.
    if PV && tt_move.is_none() && depth >= 5 * ONE_PLY {
        search::<true>(env, locals, pos, alpha, beta, depth - 2 * ONE_PLY, ply, true, None);
        tte = env.ctx.tt.retrieve(key);
        tt_move = tte
            .and_then(|e| e.mv)
            .or_else(|| locals.ss[ply].pv.first().copied());
    } else if !PV
        && tt_move.is_none()
        && depth >= 8 * ONE_PLY
        && !is_check
        && locals.ss[ply].eval >= beta - IID_MARGIN
    {
        search::<false>(
            env,
            locals,
            pos,
            beta - 1,
            beta,
            (depth / 2).min(depth - 2 * ONE_PLY),
            ply,
            false,
            None,
        );
        tte = env.ctx.tt.retrieve(key);
        tt_move = tte
            .and_then(|e| e.mv)
            .or_else(|| locals.ss[ply].pv.first().copied());
    }

    let mut mp = MovePicker::new(
        pos,
        tt_move,
        depth,
        env.ctx.history.clone(),
        locals.ss[ply].killers,
        locals.ss[ply].mate_killer,
    );

    let mut best_value = -VALUE_INFINITE;
    let mut move_count: u32 = 0;
    let mut moves_searched: Vec<ChessMove> = Vec::new();
    let use_futility =
        !PV && env.ctx.config.futility_pruning_main && !is_check && excluded.is_none();

    loop {
        if PV && alpha >= beta {
            break;
        }
        if !PV && best_value >= beta {
            break;
        }
        if stopped(env, locals.id) {
            break;
        }
        let Some(mv) = mp.next_move() else { break };
        if Some(mv) == excluded {
            continue;
        }

        let single_evasion = is_check && mp.number_of_evasions() == 1;
        let gives_check = pos.gives_check(mv);
        let capture_or_promotion = pos.is_capture_or_promotion(mv);
        let is_castle_mv = pos.is_castle(mv);

        let (mut ext, dangerous) = extension(
            &env.ctx.config,
            pos,
            mv,
            PV,
            capture_or_promotion,
            gives_check,
            single_evasion,
            mate_threat,
        );

        // Singular extension: the TT move gets one more ply when every
        // alternative fails clearly below its score.
        if depth >= if PV { 6 * ONE_PLY } else { 8 * ONE_PLY }
            && excluded.is_none()
            && ext < ONE_PLY
        {
            if let Some(e) = &tte {
                if e.mv == Some(mv) && e.bound.is_lower() && e.depth >= depth - 3 * ONE_PLY {
                    let tt_value = value_from_tt(e.value, ply);
                    if tt_value.abs() < VALUE_KNOWN_WIN {
                        let rbeta = tt_value - SINGLE_REPLY_MARGIN;
                        let exc_value = search::<false>(
                            env,
                            locals,
                            pos,
                            rbeta - 1,
                            rbeta,
                            depth / 2,
                            ply,
                            false,
                            Some(mv),
                        );
                        if exc_value < rbeta {
                            ext = ONE_PLY;
                        }
                    }
                }
            }
        }

        let new_depth = depth - ONE_PLY + ext;

        move_count += 1;
        locals.ss[ply].current_move = Some(mv);
        locals.ss[ply].quiet_move =
            !capture_or_promotion && !is_castle_mv && mv.get_promotion().is_none();
        moves_searched.push(mv);

        // Futility pruning, move-count based and value based.
        if use_futility
            && !dangerous
            && !capture_or_promotion
            && !is_castle_mv
            && Some(mv) != tt_move
        {
            if move_count >= futility_move_count(depth)
                && ok_to_prune(pos, mv, locals.ss[ply].threat_move)
                && best_value > mated_in(PLY_MAX)
            {
                continue;
            }

            let mut predicted_depth = new_depth;
            let r = env.ctx.reductions.non_pv(depth, move_count);
            if r > 0 {
                predicted_depth -= r;
            }

            if predicted_depth < SELECTIVE_DEPTH {
                let mut margin = if predicted_depth >= ONE_PLY {
                    futility_margin(predicted_depth)
                } else {
                    0
                };
                if let Some(piece) = pos.piece_on(mv.get_source()) {
                    margin += env.ctx.history.gain(pos.side_to_move(), piece, mv.get_dest());
                }
                margin += 45;

                let futility_value_scaled =
                    locals.ss[ply].eval + margin - move_count as Value * 8;
                if futility_value_scaled < beta {
                    if futility_value_scaled > best_value {
                        best_value = futility_value_scaled;
                    }
                    continue;
                }
            }
        }

        let is_killer_mv = locals.ss[ply].is_killer(mv);

        pos.do_move(mv);

        let mut value;
        if PV && move_count == 1 {
            value = -search::<true>(env, locals, pos, -beta, -alpha, new_depth, ply + 1, true, None);
        } else {
            // Late-move reduction with verification re-search.
            let mut do_full_depth_search = true;
            value = -VALUE_INFINITE;

            if depth >= 3 * ONE_PLY
                && !dangerous
                && !capture_or_promotion
                && !is_castle_mv
                && !is_killer_mv
            {
                let r = if PV {
                    env.ctx.reductions.pv(depth, move_count)
                } else {
                    env.ctx.reductions.non_pv(depth, move_count)
                };
                if r > 0 {
                    locals.ss[ply].reduction = r;
                    value = -search::<false>(
                        env,
                        locals,
                        pos,
                        -alpha - 1,
                        -alpha,
                        new_depth - r,
                        ply + 1,
                        true,
                        None,
                    );
                    do_full_depth_search = if PV { value > alpha } else { value >= beta };
                }
            }

            if do_full_depth_search {
                locals.ss[ply].reduction = 0;
                value = -search::<false>(
                    env,
                    locals,
                    pos,
                    -alpha - 1,
                    -alpha,
                    new_depth,
                    ply + 1,
                    true,
                    None,
                );

                if PV && value > alpha && value < beta {
                    value =
                        -search::<true>(env, locals, pos, -beta, -alpha, new_depth, ply + 1, true, None);
                }
            }
        }

        pos.undo_move();

        if value > best_value {
            best_value = value;
            if PV {
                if value > alpha {
                    alpha = value;
                    update_pv(&mut locals.ss, ply);
                    if value == mate_in(ply + 1) {
                        locals.ss[ply].mate_killer = Some(mv);
                    }
                }
            } else {
                if value >= beta {
                    update_pv(&mut locals.ss, ply);
                }
                if value == mate_in(ply + 1) {
                    locals.ss[ply].mate_killer = Some(mv);
                }
            }
        }

        // Cooperative split: hand the remaining moves of this node to idle
        // workers and join their result.
        if env.pool.active_threads() > 1
            && best_value < beta
            && depth >= env.ctx.config.min_split_depth
            && !stopped(env, locals.id)
            && env.pool.idle_worker_exists(locals.id)
        {
            match split::<PV>(
                env.pool,
                env.ctx,
                locals,
                pos,
                ply,
                alpha,
                beta,
                best_value,
                futility_value,
                depth,
                move_count,
                mate_threat,
                mp,
            ) {
                Ok(outcome) => {
                    best_value = outcome.best_value;
                    move_count = outcome.move_count;
                    if PV {
                        alpha = alpha.max(outcome.alpha);
                    }
                    if let Some(best) = outcome.best_move {
                        locals.ss[ply].current_move = Some(best);
                        locals.ss[ply].pv.clear();
                        locals.ss[ply].pv.extend(outcome.pv.iter().copied());
                    }
                    break;
                }
                Err(picker) => {
                    mp = picker;
                }
            }
        }
    }

    if move_count == 0 {
        // Exclusion with no legal alternative fails low for the singular
        // verification; otherwise mate or stalemate.
        return if excluded.is_some() {
            beta - 1
        } else if is_check {
            mated_in(ply)
        } else {
            VALUE_DRAW
        };
    }

    // Aborted nodes never write to the TT.
    if stopped(env, locals.id) {
        return best_value;
    }

    if (PV && best_value <= old_alpha) || (!PV && best_value < beta) {
        env.ctx
            .tt
            .store(key, value_to_tt(best_value, ply), Bound::Upper, depth, None, false);
    } else if best_value >= beta {
        let us = pos.side_to_move();
        env.pool.worker(locals.id).beta_cutoffs[us as usize]
            .fetch_add(depth.max(1) as u64, Ordering::Relaxed);

        let cutoff = locals.ss[ply].pv.first().copied();
        if let Some(cm) = cutoff {
            if !pos.is_capture_or_promotion(cm) {
                update_history(&env.ctx.history, pos, cm, depth, &moves_searched);
                locals.ss[ply].update_killers(cm);
            }
        }
        env.ctx
            .tt
            .store(key, value_to_tt(best_value, ply), Bound::Lower, depth, cutoff, false);
    } else {
        let best = locals.ss[ply].pv.first().copied();
        env.ctx
            .tt
            .store(key, value_to_tt(best_value, ply), Bound::Exact, depth, best, false);
    }

    best_value
}

/// Quiescence search: tactical continuations only, stand-pat bounded.
pub(crate) fn qsearch<const PV: bool>(
    env: SearchEnv,
    locals: &mut WorkerLocals,
    pos: &mut Position,
    mut alpha: Value,
    beta: Value,
    depth: Depth,
    ply: usize,
) -> Value {
    debug_assert!(depth <= 0);

    init_node(env, locals, ply);
    if stopped(env, locals.id) {
        return VALUE_DRAW;
    }

    if pos.is_draw() || ply >= PLY_MAX - 1 {
        return VALUE_DRAW;
    }

    let key = pos.key();
    let tte = env.ctx.tt.retrieve(key);
    let tt_move = tte.and_then(|e| e.mv);

    if !PV {
        if let Some(e) = &tte {
            if !e.bound.is_eval() && ok_to_use_tt(e, depth_to_tt(depth), beta, ply) {
                locals.ss[ply].current_move = e.mv;
                return value_from_tt(e.value, ply);
            }
        }
    }

    let is_check = pos.in_check();
    let old_alpha = alpha;

    // Stand pat.
    let static_value = if is_check {
        -VALUE_INFINITE
    } else {
        match &tte {
            Some(e) if e.bound.is_eval() => value_from_tt(e.value, ply),
            _ => evaluate(pos, &mut locals.caches),
        }
    };

    if !is_check {
        locals.ss[ply].eval = static_value;
        if ply > 0 {
            let prev = &locals.ss[ply - 1];
            update_gains(
                &env.ctx.history,
                pos,
                prev.current_move,
                prev.quiet_move,
                prev.eval,
                locals.ss[ply].eval,
            );
        }
    }

    let mut best_value = static_value;
    if best_value >= beta {
        // Remember the eval so the next visit skips the evaluation call.
        if !is_check && tte.is_none() {
            env.ctx.tt.store(
                key,
                value_to_tt(best_value, ply),
                Bound::EvalLower,
                DEPTH_NONE,
                None,
                true,
            );
        }
        return best_value;
    }
    if best_value > alpha {
        alpha = best_value;
    }

    // Near beta the horizon is pushed one ply further for checks.
    let deep_checks = depth == -ONE_PLY && static_value >= beta - PAWN_VALUE_MIDGAME / 8;
    let picker_depth = if deep_checks { DEPTH_ZERO } else { depth };
    let mut mp = MovePicker::new_qsearch(pos, tt_move, picker_depth, env.ctx.history.clone());

    let enough_material = pos.non_pawn_material(pos.side_to_move()) > ROOK_VALUE_MIDGAME;
    let futility_base = static_value + env.ctx.config.futility_margin_qs;
    let mut move_count = 0u32;

    while alpha < beta {
        let Some(mv) = mp.next_move() else { break };

        let gives_check = pos.gives_check(mv);
        move_count += 1;
        locals.ss[ply].current_move = Some(mv);
        locals.ss[ply].quiet_move = false;

        // Futility: optimistic material gain still below alpha.
        if env.ctx.config.futility_pruning_qs
            && enough_material
            && !is_check
            && !PV
            && !gives_check
            && Some(mv) != tt_move
            && mv.get_promotion().is_none()
            && !pos.is_passed_pawn_push(mv)
        {
            let futility_value = futility_base
                + pos.captured_value_endgame(mv)
                + if pos.is_en_passant(mv) { PAWN_VALUE_ENDGAME } else { 0 };
            if futility_value < alpha {
                if futility_value > best_value {
                    best_value = futility_value;
                }
                continue;
            }
        }

        // Blocking evasions that just postpone the loss are prunable too.
        let evasion_prunable = is_check
            && best_value > -VALUE_INFINITE
            && !pos.is_capture(mv)
            && pos.piece_on(mv.get_source()) != Some(chess::Piece::King)
            && pos.board().castle_rights(pos.side_to_move()) == CastleRights::NoRights;

        // Losing captures are not worth a node this close to the horizon.
        if (!is_check || evasion_prunable)
            && Some(mv) != tt_move
            && mv.get_promotion().is_none()
            && pos.see_sign(mv) < 0
        {
            continue;
        }

        pos.do_move(mv);
        let value = -qsearch::<PV>(env, locals, pos, -beta, -alpha, depth - ONE_PLY, ply + 1);
        pos.undo_move();

        if value > best_value {
            best_value = value;
            if value > alpha {
                alpha = value;
                update_pv(&mut locals.ss, ply);
            }
        }
    }

    if is_check && move_count == 0 {
        return mated_in(ply);
    }

    if stopped(env, locals.id) {
        return best_value;
    }

    let d = depth_to_tt(depth);
    if best_value <= old_alpha {
        let bound = if best_value == static_value {
            Bound::EvalUpper
        } else {
            Bound::Upper
        };
        env.ctx
            .tt
            .store(key, value_to_tt(best_value, ply), bound, d, None, best_value == static_value);
    } else if best_value >= beta {
        let cutoff = locals.ss[ply].pv.first().copied();
        env.ctx
            .tt
            .store(key, value_to_tt(best_value, ply), Bound::Lower, d, cutoff, false);
        if let Some(cm) = cutoff {
            if !pos.is_capture_or_promotion(cm) {
                locals.ss[ply].update_killers(cm);
            }
        }
    } else {
        let best = locals.ss[ply].pv.first().copied();
        env.ctx
            .tt
            .store(key, value_to_tt(best_value, ply), Bound::Exact, d, best, false);
    }

    best_value
}

#[inline]
fn depth_to_tt(depth: Depth) -> Depth {
    if depth == DEPTH_ZERO {
        DEPTH_ZERO
    } else {
        -ONE_PLY
    }
}

/// Slave (and master) loop at a split point. Consumes moves from the shared
/// picker under the split mutex and publishes improvements back, raising a
/// cutoff for every participant when beta is exceeded.
pub(crate) fn sp_search(sp: &Arc<SplitPoint>, pool: &Arc<ThreadPool>, locals: &mut WorkerLocals) {
    let ctx = &sp.ctx;
    let env = SearchEnv { ctx, pool };
    let me = locals.id;

    // Install the master's stack tail so killers, threat moves and evals
    // carry into the subtree.
    for (i, frame) in sp.stack_tail.iter().enumerate() {
        locals.ss[sp.ply - 1 + i] = frame.clone();
    }

    let mut pos = sp.pos.clone();
    let is_check = pos.in_check();
    let nodes_at_entry = pool.worker(me).nodes.load(Ordering::Relaxed);
    let use_futility = !sp.pv_node
        && ctx.config.futility_pruning_main
        && sp.depth < SELECTIVE_DEPTH
        && !is_check
        && sp.futility_value != VALUE_NONE;

    let exit_guard = loop {
        let mut shared = sp.shared.lock().unwrap();
        if shared.best_value >= sp.beta || stopped(env, me) {
            break shared;
        }
        let Some(mv) = shared.picker.next_move() else {
            break shared;
        };
        shared.move_count += 1;
        let move_count = shared.move_count;
        let local_alpha = shared.alpha;
        drop(shared);

        let gives_check = pos.gives_check(mv);
        let capture_or_promotion = pos.is_capture_or_promotion(mv);
        let is_castle_mv = pos.is_castle(mv);
        let is_killer_mv = locals.ss[sp.ply].is_killer(mv);

        locals.ss[sp.ply].current_move = Some(mv);
        locals.ss[sp.ply].quiet_move =
            !capture_or_promotion && !is_castle_mv && mv.get_promotion().is_none();

        let (ext, dangerous) = extension(
            &ctx.config,
            &pos,
            mv,
            sp.pv_node,
            capture_or_promotion,
            gives_check,
            false,
            false,
        );
        let new_depth = sp.depth - ONE_PLY + ext;

        if use_futility && !dangerous && !capture_or_promotion && !is_castle_mv {
            if move_count >= futility_move_count(sp.depth)
                && ok_to_prune(&pos, mv, locals.ss[sp.ply].threat_move)
            {
                let bv = sp.shared.lock().unwrap().best_value;
                if bv > mated_in(PLY_MAX) {
                    continue;
                }
            }

            let futility_value_scaled = sp.futility_value - move_count as Value * 8;
            if futility_value_scaled < sp.beta {
                let mut shared = sp.shared.lock().unwrap();
                if futility_value_scaled > shared.best_value {
                    shared.best_value = futility_value_scaled;
                }
                continue;
            }
        }

        pos.do_move(mv);

        let mut value = -VALUE_INFINITE;
        let mut do_full_depth_search = true;

        if !dangerous && !capture_or_promotion && !is_castle_mv && !is_killer_mv {
            let r = if sp.pv_node {
                ctx.reductions.pv(sp.depth, move_count)
            } else {
                ctx.reductions.non_pv(sp.depth, move_count)
            };
            if r > 0 {
                locals.ss[sp.ply].reduction = r;
                value = -search::<false>(
                    env,
                    locals,
                    &mut pos,
                    -local_alpha - 1,
                    -local_alpha,
                    new_depth - r,
                    sp.ply + 1,
                    true,
                    None,
                );
                do_full_depth_search = if sp.pv_node {
                    value > local_alpha
                } else {
                    value >= sp.beta
                };
            }
        }

        if do_full_depth_search {
            locals.ss[sp.ply].reduction = 0;
            let a = if sp.pv_node {
                sp.shared.lock().unwrap().alpha
            } else {
                sp.beta - 1
            };
            value =
                -search::<false>(env, locals, &mut pos, -a - 1, -a, new_depth, sp.ply + 1, true, None);

            if sp.pv_node && value > a && value < sp.beta {
                // Another worker may have raised alpha past beta already.
                let a2 = sp.shared.lock().unwrap().alpha;
                if a2 < sp.beta {
                    value = -search::<true>(
                        env,
                        locals,
                        &mut pos,
                        -sp.beta,
                        -a2,
                        new_depth,
                        sp.ply + 1,
                        true,
                        None,
                    );
                }
            }
        }

        pos.undo_move();

        if stopped(env, me) {
            break sp.shared.lock().unwrap();
        }

        let mut shared = sp.shared.lock().unwrap();
        if value > shared.best_value {
            shared.best_value = value;
            let improved_alpha = sp.pv_node && value > shared.alpha;
            if improved_alpha || (!sp.pv_node && value >= sp.beta) {
                shared.best_move = Some(mv);
                shared.pv.clear();
                shared.pv.push(mv);
                shared.pv.extend(locals.ss[sp.ply + 1].pv.iter().copied());

                if value >= sp.beta {
                    // Beta cutoff: stop everyone working at or under this
                    // split point, master included.
                    sp.finished.store(true, Ordering::SeqCst);
                    let participants = shared.slaves;
                    for i in 0..pool.active_threads() {
                        if i != me && (i == sp.master || participants & (1 << i) != 0) {
                            pool.worker(i).stop.store(true, Ordering::Relaxed);
                        }
                    }
                } else if improved_alpha {
                    shared.alpha = value;
                }
            }
        }
        drop(shared);
    };

    let mut shared = exit_guard;

    // A master stopped from above must drag its remaining slaves along.
    if sp.master == me && pool.thread_should_stop(me) {
        for i in 0..pool.active_threads() {
            if shared.slaves & (1 << i) != 0 {
                pool.worker(i).stop.store(true, Ordering::Relaxed);
            }
        }
    }

    shared.slaves &= !(1u32 << me);
    let remaining = shared.slaves;
    drop(shared);

    let delta = pool.worker(me).nodes.load(Ordering::Relaxed) - nodes_at_entry;
    sp.nodes.fetch_add(delta, Ordering::Relaxed);

    if me != sp.master {
        *pool.worker(me).current_split.lock().unwrap() = None;
        if remaining == 0 {
            pool.worker(sp.master).wake_up();
        }
    }
}
