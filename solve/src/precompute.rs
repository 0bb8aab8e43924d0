//! Diagonal-inverse precomputation (`spec.md` §4.2): computes and
//! caches `L_kk^{-1}` and `U_kk^{-1}` once per factor hand-off so every
//! later `SolveMethod::Gemm` solve call multiplies instead of
//! triangular-solving at each diagonal block — the source's `Llu->inv`
//! precomputation pass, run once rather than per call.

use crate::error::SolveResult;
use crate::kernels::{invert_unit_lower, invert_upper};
use distrisolve_layout::{local_row_blocks, FactorData, ProcessGrid};

/// Fills in `diag_inv` on every local L and U panel in place.
/// Idempotent: re-running it recomputes the same inverses. A singular
/// `U_kk` aborts with [`crate::error::SolveError::SingularDiagonal`]
/// before any later solve call can observe a bad inverse.
pub fn precompute_diagonal_inverses(grid: &ProcessGrid, factor: &mut FactorData) -> SolveResult<()> {
    // Only the diagonal owner of `k` actually holds `L_kk`/`U_kk` — a
    // process that merely owns column `k` (e.g. whenever `npcol == 1`
    // with `nprow > 1`, every process "owns" every column) holds only
    // off-diagonal rows in its column-`k` panel, so filtering on column
    // ownership alone picked up the wrong block. Filtering on
    // `is_diag_owner` directly, and looking the block up by `k` itself
    // rather than by panel-local position, fixes both loops.
    for k in local_row_blocks(grid, &factor.supernodes) {
        if !grid.is_diag_owner(k) {
            continue;
        }

        let col_lk = grid.local_col_index(k);
        if let Some(panel) = factor.l_panels.get_mut(&col_lk) {
            if let Some(diag) = panel.diag_block(k) {
                let inv = invert_unit_lower(diag);
                panel.diag_inv = Some(inv);
            }
        }

        let row_lk = grid.local_row_index(k);
        if let Some(panel) = factor.u_panels.get_mut(&row_lk) {
            if let Some(diag) = panel.block_for(k) {
                let inv = invert_upper(diag.values.view(), k)?;
                panel.diag_inv = Some(inv);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use distrisolve_layout::{LPanel, UBlock, UPanel};
    use ndarray::array;

    // Exercises the pure-array half (no live process grid needed): the
    // inverses this function would compute for a single locally owned
    // supernode are the same ones `kernels::invert_*` already cover.
    #[test]
    fn inverts_match_the_kernel_level_round_trip() {
        let l = array![[1.0, 0.0], [3.0, 1.0]];
        let u = array![[2.0, 1.0], [0.0, 2.0]];
        let l_inv = invert_unit_lower(l.view());
        let u_inv = invert_upper(u.view(), 0).unwrap();

        let mut panel = LPanel {
            block_rows: vec![0],
            row_offsets: vec![0, 2],
            values: l.clone(),
            diag_inv: None,
        };
        panel.diag_inv = Some(invert_unit_lower(panel.diag_block(0).unwrap()));
        assert_eq!(panel.diag_inv.unwrap(), l_inv);

        let mut upanel = UPanel {
            blocks: vec![UBlock {
                col_block: 0,
                first_row_offset: 0,
                values: u,
            }],
            diag_inv: None,
        };
        let diag = upanel.block_for(0).unwrap().values.view();
        upanel.diag_inv = Some(invert_upper(diag, 0).unwrap());
        assert_eq!(upanel.diag_inv.unwrap(), u_inv);
    }
}
