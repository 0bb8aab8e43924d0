//! Forward solver: the L-sweep (`spec.md` §4.3).
//!
//! A single self-scheduling, message-driven loop per process. There is
//! no outer loop over supernode index — progress is driven entirely by
//! modification-counter arithmetic and the one blocking "any source,
//! any tag" receive that is this process's sole suspension point,
//! mirroring the teacher's preference for explicit message loops over
//! hidden async machinery (`examples/rusty-fast-solvers-bempp-rs/tree/
//! src/implementations/impl_multi_node.rs`).
//!
//! Tie-break rule (`spec.md` §4.3 step 3): when a receive makes more
//! than one local block simultaneously solvable — possible only when a
//! process owns several block-rows sharing the same reduction/broadcast
//! parent — they are processed in discovery order. No priority queue
//! is needed: every order reaches the same fixed point, since solving
//! one ready block can only ever unblock others, never re-block them.

use crate::blockstore::BlockStore;
use crate::counters::{ModCounters, PendingMessages};
use crate::error::SolveResult;
use crate::kernels::{self, SolveMethod};
use crate::wire;
use distrisolve_layout::{local_col_blocks, local_row_blocks, FactorData, ProcessGrid};
use mpi::request::{LocalScope, Request};
use mpi::traits::*;
use ndarray::Array2;

struct ForwardCtx<'a> {
    grid: &'a ProcessGrid,
    factor: &'a FactorData,
    nrhs: usize,
    method: SolveMethod,
}

struct SweepState {
    x: BlockStore,
    lsum: BlockStore,
    counters: ModCounters,
    pending: PendingMessages,
}

/// Runs the forward sweep to completion: `x` must already hold the
/// redistributed right-hand side at every diagonal-owned block
/// (written by [`distrisolve_layout::redistribution::RedistributionPlan::scatter_b_to_x`]);
/// on return it holds the solution of `L y = b` at those same blocks.
pub fn forward_solve(
    grid: &ProcessGrid,
    factor: &FactorData,
    x: BlockStore,
    nrhs: usize,
    method: SolveMethod,
) -> SolveResult<BlockStore> {
    let ctx = ForwardCtx {
        grid,
        factor,
        nrhs,
        method,
    };
    let local_rows = local_row_blocks(grid, &factor.supernodes);
    let local_cols = local_col_blocks(grid, &factor.supernodes);

    let frecv: Vec<i64> = local_rows
        .iter()
        .map(|&k| factor.reduction_trees[k].dest_count() as i64)
        .collect();
    let pending = PendingMessages {
        nrecvmod: frecv.iter().sum(),
        nrecvx: local_cols
            .iter()
            .filter(|&&k| !factor.broadcast_trees[k].is_root())
            .count() as i64,
    };

    let mut state = SweepState {
        x,
        lsum: BlockStore::zeros_for(local_rows.iter().copied(), &factor.supernodes, nrhs),
        counters: ModCounters::new(&factor.fmod_template, frecv),
        pending,
    };

    mpi::request::scope(|scope| {
        let mut sends: Vec<Request<'_, [f64]>> = Vec::new();

        // Seed every row-owned block-row whose counters are already
        // solvable at t=0, not only diagonal owners: a non-diagonal
        // row-owner can start with `fmod==0 && frecv==0` too (e.g. the
        // very first supernode has no predecessor column, so every
        // process's `fmod` for it is zero), and nothing else will ever
        // decrement an already-zero counter to notice. `on_row_ready`
        // already branches on `is_diag_owner`, so it alone covers both
        // cases here (mirrors the original's `LRtree_ptr[lk] == NULL`
        // vs. non-NULL split, which only skips seeding for blocks that
        // truly expect a peer contribution).
        for &k in &local_rows {
            let lk = grid.local_row_index(k);
            if state.counters.is_solvable(lk) {
                on_row_ready(&ctx, &mut state, k, scope, &mut sends)?;
            }
        }

        while !state.pending.is_done() {
            let (msg, status) = grid.world_comm().any_process().matched_probe();
            let count = msg.count(f64::equivalent_datatype()) as usize;
            let mut buf = vec![0f64; count];
            msg.matched_receive_into(&mut buf[..]);
            let tag = status.tag();

            if wire::is_lsum_tag(tag, factor.supernodes.nsup()) {
                let (i, contrib) = wire::parse_lsum(&buf, nrhs);
                state.pending.nrecvmod -= 1;
                {
                    let acc = state.lsum.get_mut(i).expect("row-owned lsum block allocated");
                    *acc += &contrib;
                }
                let lk_i = grid.local_row_index(i);
                state.counters.decrement_recv(lk_i);
                if state.counters.is_solvable(lk_i) {
                    on_row_ready(&ctx, &mut state, i, scope, &mut sends)?;
                }
            } else {
                let (k, xk) = wire::parse_x(&buf, nrhs);
                state.pending.nrecvx -= 1;
                state.x.insert(k, xk.clone());
                forward_x_to_children(&ctx, k, &xk, scope, &mut sends);
                apply_l_panel_updates(&ctx, &mut state, k, &xk, scope, &mut sends)?;
            }
        }

        mpi::request::wait_all(&mut sends);
        Ok(state.x)
    })
}

/// Solves `X_k := L_kk^{-1} (X_k + LSUM_k)` at the diagonal owner,
/// marks it solved, broadcasts the result down `LBtree[k]`, then
/// applies this process's own off-diagonal rows in column `k`.
fn run_diagonal_solve<'a>(
    ctx: &ForwardCtx<'_>,
    state: &mut SweepState,
    k: usize,
    scope: &LocalScope<'a>,
    sends: &mut Vec<Request<'a, [f64]>>,
) -> SolveResult<()> {
    let lk = ctx.grid.local_row_index(k);
    let local_col = ctx.grid.local_col_index(k);
    let panel = ctx
        .factor
        .l_panels
        .get(&local_col)
        .expect("diagonal owner holds its own L panel");

    let mut rhs = state.x.get(k).expect("redistributed rhs present at diag owner").clone();
    if let Some(contrib) = state.lsum.get(k) {
        rhs += contrib;
    }

    // Falls back to TRSM whenever no precomputed inverse is present,
    // regardless of `method` — mathematically equivalent, just the
    // slower path, and strictly better than failing a solve over a
    // config/precompute mismatch.
    match (ctx.method, &panel.diag_inv) {
        (SolveMethod::Gemm, Some(inv)) => {
            let mut solved = Array2::<f64>::zeros(rhs.dim());
            kernels::gemm(1.0, inv.view(), rhs.view(), 0.0, solved.view_mut());
            rhs = solved;
        }
        _ => kernels::trsm_lower_unit(
            panel.diag_block(k).expect("diagonal owner holds its own L_kk block"),
            rhs.view_mut(),
            1.0,
        ),
    }

    state.x.insert(k, rhs.clone());
    state.counters.mark_solved(lk)?;

    forward_x_to_children(ctx, k, &rhs, scope, sends);
    apply_l_panel_updates(ctx, state, k, &rhs, scope, sends)?;
    Ok(())
}

fn forward_x_to_children<'a>(
    ctx: &ForwardCtx<'_>,
    k: usize,
    xk: &Array2<f64>,
    scope: &LocalScope<'a>,
    sends: &mut Vec<Request<'a, [f64]>>,
) {
    let tree = &ctx.factor.broadcast_trees[k];
    for &child in tree.children() {
        let payload = wire::x_payload(k, xk);
        let req = ctx
            .grid
            .world_comm()
            .process_at_rank(child)
            .immediate_send_with_tag(scope, payload, wire::x_tag(k));
        sends.push(req);
    }
}

/// Applies `LSUM_i -= L_{i,k} X_k` for every off-diagonal block-row `i`
/// this process holds in its own column-`k` L panel, then dispatches
/// any row that becomes solvable as a result.
fn apply_l_panel_updates<'a>(
    ctx: &ForwardCtx<'_>,
    state: &mut SweepState,
    k: usize,
    xk: &Array2<f64>,
    scope: &LocalScope<'a>,
    sends: &mut Vec<Request<'a, [f64]>>,
) -> SolveResult<()> {
    let local_col = ctx.grid.local_col_index(k);
    let Some(panel) = ctx.factor.l_panels.get(&local_col) else {
        return Ok(());
    };

    for (idx, &i) in panel.block_rows.iter().enumerate() {
        if i == k {
            continue;
        }
        let (s, e) = (panel.row_offsets[idx], panel.row_offsets[idx + 1]);
        let l_ik = panel.values.slice(ndarray::s![s..e, ..]);
        {
            let acc = state.lsum.get_mut(i).expect("row-owned lsum block allocated");
            kernels::gemm(-1.0, l_ik, xk.view(), 1.0, acc.view_mut());
        }
        let lk_i = ctx.grid.local_row_index(i);
        state.counters.decrement_mod(lk_i);
        if state.counters.is_solvable(lk_i) {
            on_row_ready(ctx, state, i, scope, sends)?;
        }
    }
    Ok(())
}

/// A row-owned block-row `i` has just become solvable: if this process
/// is its diagonal owner, run the diagonal solve directly; otherwise
/// forward the accumulated partial sum to the parent in `LRtree[i]`.
fn on_row_ready<'a>(
    ctx: &ForwardCtx<'_>,
    state: &mut SweepState,
    i: usize,
    scope: &LocalScope<'a>,
    sends: &mut Vec<Request<'a, [f64]>>,
) -> SolveResult<()> {
    if ctx.grid.is_diag_owner(i) {
        run_diagonal_solve(ctx, state, i, scope, sends)
    } else {
        // Not a diagonal solve, but `i` is done contributing: mark it
        // solved so a later decrement for the same local block-row
        // can never re-trigger this forward (`spec.md` §3: "FMOD[lk]
        // ... set to -1 and never re-entered" applies to every
        // locally owned block-row, not only diagonal owners).
        let lk = ctx.grid.local_row_index(i);
        state.counters.mark_solved(lk)?;

        let block = state.lsum.get(i).expect("row-owned lsum block allocated").clone();
        let parent = ctx.factor.reduction_trees[i]
            .parent()
            .expect("non-root member of a reduction tree has a parent");
        let payload = wire::lsum_payload(i, &block);
        let tag = wire::lsum_tag(ctx.factor.supernodes.nsup(), i);
        let req = ctx
            .grid
            .world_comm()
            .process_at_rank(parent)
            .immediate_send_with_tag(scope, payload, tag);
        sends.push(req);
        Ok(())
    }
}
