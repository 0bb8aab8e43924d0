//! Process grid, supernode layout, communication trees, and
//! redistribution descriptors for a distributed sparse-direct
//! triangular solve.
//!
//! This crate owns everything `spec.md` calls "factor-resident":
//! structures that are built once alongside the LU factorization and
//! referenced read-only by every subsequent solve call. The solve
//! engine itself — the per-call forward/backward sweeps — lives in
//! `distrisolve-solve`.

pub mod error;
pub mod grid;
pub mod redistribution;
pub mod supernode;
pub mod trees;

pub use error::{LayoutError, LayoutResult};
pub use grid::ProcessGrid;
pub use redistribution::{Permutations, RedistributionPlan, RowOwnerMap};
pub use supernode::{
    local_col_blocks, local_diag_layout, local_row_blocks, LPanel, SupernodeSet, UBlock, UPanel,
    UVerticalIndex,
};
pub use trees::{BroadcastTree, ReductionTree};

/// Factor-resident structures consumed read-only by the solve engine:
/// the supernode partition, local L/U panels, and per-supernode
/// broadcast/reduction trees (`spec.md` §6 "Inputs consumed from
/// collaborators").
pub struct FactorData {
    pub supernodes: SupernodeSet,
    /// Local L panels keyed by local block-column index.
    pub l_panels: std::collections::HashMap<usize, LPanel>,
    /// Local U panels keyed by local block-row index.
    pub u_panels: std::collections::HashMap<usize, UPanel>,
    pub broadcast_trees: Vec<BroadcastTree>,
    pub reduction_trees: Vec<ReductionTree>,
    /// Template modification counts copied into a fresh `fmod` at the
    /// start of every solve call.
    pub fmod_template: Vec<i64>,
    /// Template modification counts copied into a fresh `bmod` at the
    /// start of every solve call.
    pub bmod_template: Vec<i64>,
}

impl FactorData {
    /// Builds the per-supernode broadcast and reduction trees from the
    /// grid and supernode partition alone (`spec.md` §4.5: tree
    /// topology needs no communication to construct).
    pub fn build_trees(grid: &ProcessGrid, supernodes: &SupernodeSet) -> (Vec<BroadcastTree>, Vec<ReductionTree>) {
        let broadcast_trees = (0..supernodes.nsup())
            .map(|k| BroadcastTree::build(grid, k))
            .collect();
        let reduction_trees = (0..supernodes.nsup())
            .map(|k| ReductionTree::build(grid, k))
            .collect();
        (broadcast_trees, reduction_trees)
    }

    /// The per-block-row vertical index over U, built once per solve
    /// call from the local panels (`spec.md` §3).
    ///
    /// `u_panels` is keyed by *local* row-block index, but
    /// [`UVerticalIndex::rows_for_col`] must hand back *global* block
    /// indices (callers feed them straight back into
    /// `grid.local_row_index` / `u_panels.get`), so each key is
    /// converted back to its global index (`lk * nprow + grid.myrow()`,
    /// the inverse of `ProcessGrid::local_row_index`) before insertion.
    pub fn build_u_vertical_index(&self, grid: &ProcessGrid) -> UVerticalIndex {
        UVerticalIndex::build(
            self.u_panels
                .iter()
                .map(|(&lk, panel)| (lk * grid.nprow() + grid.myrow(), panel)),
        )
    }
}
