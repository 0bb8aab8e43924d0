//! Backward solver: the U-sweep (`spec.md` §4.4).
//!
//! Structurally the mirror of [`crate::forward`]: the same self-
//! scheduling loop, the same `LBtree`/`LRtree` topology, `BMOD`/`BRECV`
//! in place of `FMOD`/`FRECV`. The one real asymmetry is how a solved
//! `X_k` finds the rows it must update: the forward sweep reads them
//! straight out of the L panel it's already iterating over column-major,
//! while here the U panels are row-major (`spec.md` §3: owner row of a
//! U block-row panel is `k mod P_r`), so the set of rows waiting on
//! column `k` has to come from the vertical index built over this
//! process's own panels, not from `k`'s own panel.
//!
//! The source computes `brecv` via a row-scope `MPI_Allreduce` over a
//! `mod_bit` indicator (`pdgstrs.c`, around the `dBRecvtrees` setup) to
//! account for reduction-tree members that, under the real sparsity
//! pattern, contribute to no block at all. Our reduction trees already
//! span exactly the dense group used by the worked examples (`trees.rs`
//! doc comment), so `brecv[lk]` is just `reduction_trees[k].dest_count()`
//! directly — the allreduce would be a no-op over that same value and
//! is omitted (recorded in `DESIGN.md`).

use crate::blockstore::BlockStore;
use crate::counters::{ModCounters, PendingMessages};
use crate::error::SolveResult;
use crate::kernels::{self, SolveMethod};
use crate::wire;
use distrisolve_layout::{local_col_blocks, local_row_blocks, FactorData, ProcessGrid, UVerticalIndex};
use mpi::request::{LocalScope, Request};
use mpi::traits::*;
use ndarray::Array2;

struct BackwardCtx<'a> {
    grid: &'a ProcessGrid,
    factor: &'a FactorData,
    vindex: UVerticalIndex,
    nrhs: usize,
    method: SolveMethod,
}

struct SweepState {
    x: BlockStore,
    lsum: BlockStore,
    counters: ModCounters,
    pending: PendingMessages,
}

/// Runs the backward sweep to completion: `x` must hold the forward
/// sweep's output at every diagonal-owned block; on return it holds
/// the solution of `U x = y` at those same blocks.
pub fn backward_solve(
    grid: &ProcessGrid,
    factor: &FactorData,
    x: BlockStore,
    nrhs: usize,
    method: SolveMethod,
) -> SolveResult<BlockStore> {
    let ctx = BackwardCtx {
        grid,
        factor,
        vindex: factor.build_u_vertical_index(grid),
        nrhs,
        method,
    };
    let local_rows = local_row_blocks(grid, &factor.supernodes);
    let local_cols = local_col_blocks(grid, &factor.supernodes);

    let brecv: Vec<i64> = local_rows
        .iter()
        .map(|&k| factor.reduction_trees[k].dest_count() as i64)
        .collect();
    let pending = PendingMessages {
        nrecvmod: brecv.iter().sum(),
        nrecvx: local_cols
            .iter()
            .filter(|&&k| !factor.broadcast_trees[k].is_root())
            .count() as i64,
    };

    let mut state = SweepState {
        x,
        lsum: BlockStore::zeros_for(local_rows.iter().copied(), &factor.supernodes, nrhs),
        counters: ModCounters::new(&factor.bmod_template, brecv),
        pending,
    };

    mpi::request::scope(|scope| {
        let mut sends: Vec<Request<'_, [f64]>> = Vec::new();

        // See the identical note in `forward.rs`: seed every row-owned
        // block-row solvable at t=0, not only diagonal owners, or a
        // non-diagonal leaf of its reduction tree never forwards its
        // (possibly zero-contribution) partial sum and the diagonal
        // owner counting on it blocks forever.
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
                apply_u_vertical_updates(&ctx, &mut state, k, &xk, scope, &mut sends)?;
            }
        }

        mpi::request::wait_all(&mut sends);
        Ok(state.x)
    })
}

/// Solves `X_k := U_kk^{-1} (X_k + LSUM_k)` at the diagonal owner,
/// marks it solved, broadcasts down `LBtree[k]`, then applies the
/// column-`k` updates this process owes via its own U panels.
fn run_diagonal_solve<'a>(
    ctx: &BackwardCtx<'_>,
    state: &mut SweepState,
    k: usize,
    scope: &LocalScope<'a>,
    sends: &mut Vec<Request<'a, [f64]>>,
) -> SolveResult<()> {
    let lk = ctx.grid.local_row_index(k);
    let panel = ctx
        .factor
        .u_panels
        .get(&lk)
        .expect("diagonal owner holds its own U panel");

    let mut rhs = state.x.get(k).expect("forward-solved rhs present at diag owner").clone();
    if let Some(contrib) = state.lsum.get(k) {
        rhs += contrib;
    }

    let diag_values = panel
        .block_for(k)
        .expect("U panel carries its own diagonal block")
        .values
        .view();

    // Falls back to TRSM whenever no precomputed inverse is present,
    // regardless of `method` (see the identical note in `forward.rs`).
    match (ctx.method, &panel.diag_inv) {
        (SolveMethod::Gemm, Some(inv)) => {
            let mut solved = Array2::<f64>::zeros(rhs.dim());
            kernels::gemm(1.0, inv.view(), rhs.view(), 0.0, solved.view_mut());
            rhs = solved;
        }
        _ => kernels::trsm_upper(diag_values, rhs.view_mut(), 1.0),
    }

    state.x.insert(k, rhs.clone());
    state.counters.mark_solved(lk)?;

    forward_x_to_children(ctx, k, &rhs, scope, sends);
    apply_u_vertical_updates(ctx, state, k, &rhs, scope, sends)?;
    Ok(())
}

fn forward_x_to_children<'a>(
    ctx: &BackwardCtx<'_>,
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

/// Applies `LSUM_j -= U_{j,k} X_k` for every row-block `j` this process
/// owns that has a nonzero column-block `k` (found via the vertical
/// index over this process's own U panels), then dispatches any row
/// that becomes solvable as a result.
fn apply_u_vertical_updates<'a>(
    ctx: &BackwardCtx<'_>,
    state: &mut SweepState,
    k: usize,
    xk: &Array2<f64>,
    scope: &LocalScope<'a>,
    sends: &mut Vec<Request<'a, [f64]>>,
) -> SolveResult<()> {
    for &j in ctx.vindex.rows_for_col(k) {
        if j == k {
            continue;
        }
        let lj = ctx.grid.local_row_index(j);
        let panel = ctx
            .factor
            .u_panels
            .get(&lj)
            .expect("vertical index only names rows this process holds");
        let block = panel
            .block_for(k)
            .expect("vertical index guarantees this column-block is present");

        {
            let acc = state.lsum.get_mut(j).expect("row-owned lsum block allocated");
            kernels::gemm(-1.0, block.values.view(), xk.view(), 1.0, acc.view_mut());
        }
        state.counters.decrement_mod(lj);
        if state.counters.is_solvable(lj) {
            on_row_ready(ctx, state, j, scope, sends)?;
        }
    }
    Ok(())
}

fn on_row_ready<'a>(
    ctx: &BackwardCtx<'_>,
    state: &mut SweepState,
    i: usize,
    scope: &LocalScope<'a>,
    sends: &mut Vec<Request<'a, [f64]>>,
) -> SolveResult<()> {
    if ctx.grid.is_diag_owner(i) {
        run_diagonal_solve(ctx, state, i, scope, sends)
    } else {
        // See the identical note in `forward.rs::on_row_ready`: mark
        // `i` solved here too, not only at diagonal owners, so BMOD/
        // BRECV can never re-trigger this forward for the same local
        // block-row.
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
