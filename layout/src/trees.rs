//! Per-supernode broadcast trees (down a process column) and reduction
//! trees (across a process row), as specified in `spec.md` §3 and §4.5.
//!
//! Topology is derived purely from `(P_r, P_c, k)` — no communication
//! is needed to build it, only to use it, matching the teacher's
//! treatment of tree structure as precomputed metadata that the
//! runtime point-to-point calls reference by supernode index
//! (`examples/rusty-fast-solvers-bempp-rs/tree/src/implementations/impl_multi_node.rs`).

use crate::grid::ProcessGrid;
use mpi::topology::Rank;

/// This process's role within a binary spanning tree over a linear
/// group of `group_size` members, rooted at `root_index`.
#[derive(Debug, Clone, Copy)]
struct TreeRole {
    parent: Option<usize>,
    children: [Option<usize>; 2],
}

/// Standard binary-heap-style spanning tree over a ring of
/// `group_size` members, renumbered relative to `root_index` so the
/// root always sits at relative position 0.
fn binary_tree_role(group_size: usize, root_index: usize, my_index: usize) -> TreeRole {
    let rel = (my_index + group_size - root_index) % group_size;
    let parent = if rel == 0 {
        None
    } else {
        let prel = (rel - 1) / 2;
        Some((prel + root_index) % group_size)
    };
    let mut children = [None, None];
    for (slot, child_rel) in [2 * rel + 1, 2 * rel + 2].into_iter().enumerate() {
        if child_rel < group_size {
            children[slot] = Some((child_rel + root_index) % group_size);
        }
    }
    TreeRole { parent, children }
}

/// Spanning tree over the process column hosting supernode `k`,
/// rooted at the diagonal owner, delivering `X_k` to every consumer.
#[derive(Debug, Clone)]
pub struct BroadcastTree {
    supernode: usize,
    is_root: bool,
    parent: Option<Rank>,
    children: Vec<Rank>,
}

impl BroadcastTree {
    /// Builds this process's view of `LBtree[k]`: the tree spans the
    /// `nprow` processes sharing `grid.mycol()`, rooted at
    /// `grid.owner_prow(k)`.
    pub fn build(grid: &ProcessGrid, k: usize) -> Self {
        let nprow = grid.nprow();
        let root_row = grid.owner_prow(k);
        let role = binary_tree_role(nprow, root_row, grid.myrow());
        let to_rank = |row: usize| grid.pnum(row, grid.mycol());

        BroadcastTree {
            supernode: k,
            is_root: role.parent.is_none(),
            parent: role.parent.map(to_rank),
            children: role.children.into_iter().flatten().map(to_rank).collect(),
        }
    }

    pub fn supernode(&self) -> usize {
        self.supernode
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn parent(&self) -> Option<Rank> {
        self.parent
    }

    pub fn children(&self) -> &[Rank] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Spanning tree over the process row hosting supernode `k`, rooted
/// at the diagonal owner, summing LSUM contributions toward the root.
#[derive(Debug, Clone)]
pub struct ReductionTree {
    supernode: usize,
    is_root: bool,
    parent: Option<Rank>,
    children: Vec<Rank>,
}

impl ReductionTree {
    /// Builds this process's view of `LRtree[k]`: the tree spans the
    /// `npcol` processes sharing `grid.myrow()`, rooted at
    /// `grid.owner_pcol(k)`.
    pub fn build(grid: &ProcessGrid, k: usize) -> Self {
        let npcol = grid.npcol();
        let root_col = grid.owner_pcol(k);
        let role = binary_tree_role(npcol, root_col, grid.mycol());
        let to_rank = |col: usize| grid.pnum(grid.myrow(), col);

        ReductionTree {
            supernode: k,
            is_root: role.parent.is_none(),
            parent: role.parent.map(to_rank),
            children: role.children.into_iter().flatten().map(to_rank).collect(),
        }
    }

    pub fn supernode(&self) -> usize {
        self.supernode
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn parent(&self) -> Option<Rank> {
        self.parent
    }

    pub fn children(&self) -> &[Rank] {
        &self.children
    }

    /// Number of direct contributions this node waits for before it
    /// may forward (or, at the root, consume) the accumulated sum.
    /// Corresponds to the source's `RdTree_GetDestCount`.
    pub fn dest_count(&self) -> usize {
        self.children.len()
    }
}
