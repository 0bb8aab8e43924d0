//! Supernode boundaries, local block addressing, and panel storage.
//!
//! `LPanel`/`UPanel` replace the original's pointer-and-header buffers
//! (`spec.md` §9 Design Notes) with an explicit block-descriptor
//! container: a block index maps to a `(header, payload-slice)` pair
//! instead of being recovered by pointer arithmetic over one flat
//! array.

use crate::grid::ProcessGrid;
use ndarray::Array2;
use std::collections::HashMap;

/// Global supernode partition: NSUP supernodes, contiguous column
/// ranges `[fst(k), fst(k) + size(k))`.
#[derive(Debug, Clone)]
pub struct SupernodeSet {
    fst: Vec<usize>,
    size: Vec<usize>,
}

impl SupernodeSet {
    /// Builds a supernode set from per-supernode sizes; `fst` offsets
    /// are derived as the running prefix sum.
    pub fn from_sizes(sizes: Vec<usize>) -> Self {
        let mut fst = Vec::with_capacity(sizes.len());
        let mut acc = 0usize;
        for &s in &sizes {
            fst.push(acc);
            acc += s;
        }
        SupernodeSet { fst, size: sizes }
    }

    pub fn nsup(&self) -> usize {
        self.size.len()
    }

    pub fn fst_col(&self, k: usize) -> usize {
        self.fst[k]
    }

    pub fn size(&self, k: usize) -> usize {
        self.size[k]
    }

    pub fn end_col(&self, k: usize) -> usize {
        self.fst[k] + self.size[k]
    }

    pub fn n(&self) -> usize {
        self.fst.last().copied().unwrap_or(0) + self.size.last().copied().unwrap_or(0)
    }

    /// Finds the supernode containing global column/row `col` via
    /// binary search over the supernode starts.
    pub fn block_containing(&self, col: usize) -> usize {
        match self.fst.binary_search(&col) {
            Ok(k) => k,
            Err(0) => 0,
            Err(k) => k - 1,
        }
    }
}

/// A compressed L block-column: all nonzero blocks of column-block `j`
/// (owner column = `j mod P_c`), stacked column-major with the
/// supplied block-row list giving the mapping from stacked row offset
/// back to the owning global block-row.
#[derive(Debug, Clone)]
pub struct LPanel {
    /// Global block-row indices present in this panel, ascending,
    /// diagonal block first.
    pub block_rows: Vec<usize>,
    /// Row offset (into `values`) at which each entry of `block_rows`
    /// begins; length `block_rows.len() + 1`, monotonically increasing.
    pub row_offsets: Vec<usize>,
    /// Dense values, shape `(total_rows, ncols)`, column-major within
    /// the panel.
    pub values: Array2<f64>,
    /// Precomputed inverse of the unit-lower diagonal block `L_kk`,
    /// when diagonal-inverse precomputation is enabled.
    pub diag_inv: Option<Array2<f64>>,
}

impl LPanel {
    /// Row-range (start, end) of `block_row` within `values`, if present.
    pub fn row_range(&self, block_row: usize) -> Option<(usize, usize)> {
        self.block_rows
            .iter()
            .position(|&r| r == block_row)
            .map(|i| (self.row_offsets[i], self.row_offsets[i + 1]))
    }

    /// The diagonal block `L_kk` of this panel, if this process actually
    /// holds block-row `k` (only the diagonal owner does — a column
    /// owner that isn't also `k`'s row owner holds only off-diagonal
    /// rows, so this must look up by `block_row == k` rather than
    /// assume `block_rows[0]` is the diagonal, mirroring
    /// [`UPanel::block_for`]'s `Option`-based lookup).
    pub fn diag_block(&self, block_row: usize) -> Option<ndarray::ArrayView2<'_, f64>> {
        let (s, e) = self.row_range(block_row)?;
        Some(self.values.slice(ndarray::s![s..e, ..]))
    }
}

/// A single nonzero column-block within a U block-row panel, carrying
/// the first-nonzero-row offset within the block-row's supernode.
#[derive(Debug, Clone)]
pub struct UBlock {
    pub col_block: usize,
    pub first_row_offset: usize,
    pub values: Array2<f64>,
}

/// A compressed U block-row: all nonzero column-blocks of row-block
/// `k` (owner row = `k mod P_r`).
#[derive(Debug, Clone, Default)]
pub struct UPanel {
    pub blocks: Vec<UBlock>,
    /// Precomputed inverse of the upper diagonal block `U_kk`.
    pub diag_inv: Option<Array2<f64>>,
}

impl UPanel {
    pub fn block_for(&self, col_block: usize) -> Option<&UBlock> {
        self.blocks.iter().find(|b| b.col_block == col_block)
    }
}

/// The "vertical linked list" over U: maps a column-block index back
/// to every row-block that holds a nonzero block there. Built once per
/// solve call from the local `UPanel`s (`spec.md` §3).
///
/// Both the column-block key and the row-block values it stores are
/// *global* supernode indices, matching `rows_for_col`'s callers (they
/// turn straight around and re-derive a local index via
/// `ProcessGrid::local_row_index`); `build`'s input iterator must
/// therefore yield `(global_row_block, panel)` pairs, not the local
/// indices `u_panels` happens to be keyed by.
#[derive(Debug, Clone, Default)]
pub struct UVerticalIndex {
    col_to_rows: HashMap<usize, Vec<usize>>,
}

impl UVerticalIndex {
    pub fn build<'a>(panels: impl Iterator<Item = (usize, &'a UPanel)>) -> Self {
        let mut col_to_rows: HashMap<usize, Vec<usize>> = HashMap::new();
        for (row_block, panel) in panels {
            for ub in &panel.blocks {
                col_to_rows.entry(ub.col_block).or_default().push(row_block);
            }
        }
        UVerticalIndex { col_to_rows }
    }

    pub fn rows_for_col(&self, col_block: usize) -> &[usize] {
        self.col_to_rows
            .get(&col_block)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Global indices of every block-row this process owns in the row
/// dimension, ascending; a value's position in this list is the local
/// index `lk` used to address `fmod`/`frecv`/`bmod`/`brecv` (`spec.md`
/// §3).
pub fn local_row_blocks(grid: &ProcessGrid, supernodes: &SupernodeSet) -> Vec<usize> {
    (0..supernodes.nsup()).filter(|&k| grid.owns_row(k)).collect()
}

/// Global indices of every block-column this process owns in the
/// column dimension, ascending.
pub fn local_col_blocks(grid: &ProcessGrid, supernodes: &SupernodeSet) -> Vec<usize> {
    (0..supernodes.nsup()).filter(|&k| grid.owns_col(k)).collect()
}

/// Compact local offsets for this process's own diagonal-owned
/// supernodes, plus the total width of that footprint. `X`/`LSUM` live
/// only on diagonal owners (`spec.md` §3: "a local block-partitioned
/// array"), so the orchestration layer sizes its flat glue buffer to
/// `local_width` rather than the global matrix order `N` and looks up
/// each diagonal-owned block's base offset here instead of its global
/// `fst_col(k)`.
pub fn local_diag_layout(grid: &ProcessGrid, supernodes: &SupernodeSet) -> (HashMap<usize, usize>, usize) {
    let mut offsets = HashMap::new();
    let mut width = 0usize;
    for k in 0..supernodes.nsup() {
        if grid.is_diag_owner(k) {
            offsets.insert(k, width);
            width += supernodes.size(k);
        }
    }
    (offsets, width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supernode_boundaries_from_sizes() {
        let sup = SupernodeSet::from_sizes(vec![3, 3]);
        assert_eq!(sup.nsup(), 2);
        assert_eq!(sup.fst_col(0), 0);
        assert_eq!(sup.fst_col(1), 3);
        assert_eq!(sup.end_col(1), 6);
        assert_eq!(sup.n(), 6);
    }

    #[test]
    fn block_containing_binary_searches_starts() {
        let sup = SupernodeSet::from_sizes(vec![1, 1, 1, 1, 1, 1, 1, 1]);
        for col in 0..8 {
            assert_eq!(sup.block_containing(col), col);
        }

        let sup = SupernodeSet::from_sizes(vec![3, 3]);
        assert_eq!(sup.block_containing(0), 0);
        assert_eq!(sup.block_containing(2), 0);
        assert_eq!(sup.block_containing(3), 1);
        assert_eq!(sup.block_containing(5), 1);
    }

    #[test]
    fn u_vertical_index_groups_by_column_block() {
        let mut panel0 = UPanel::default();
        panel0.blocks.push(UBlock {
            col_block: 2,
            first_row_offset: 0,
            values: Array2::zeros((1, 1)),
        });
        let mut panel1 = UPanel::default();
        panel1.blocks.push(UBlock {
            col_block: 2,
            first_row_offset: 0,
            values: Array2::zeros((1, 1)),
        });

        let panels = vec![(0usize, &panel0), (1usize, &panel1)];
        let idx = UVerticalIndex::build(panels.into_iter());
        let mut rows = idx.rows_for_col(2).to_vec();
        rows.sort_unstable();
        assert_eq!(rows, vec![0, 1]);
        assert!(idx.rows_for_col(99).is_empty());
    }
}
