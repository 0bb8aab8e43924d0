//! Per-call dense storage for `X` and `LSUM`, keyed by global supernode
//! index rather than a flat offset — the direct expression of `spec.md`
//! §3's invariant that "X and LSUM always carry the correct global
//! block index", mirroring the header/payload split in
//! `distrisolve_layout::supernode::LPanel`.

use distrisolve_layout::SupernodeSet;
use ndarray::Array2;
use std::collections::HashMap;

/// A sparse collection of dense `(size(k), nrhs)` blocks, one per global
/// supernode index this process holds.
#[derive(Debug, Default)]
pub struct BlockStore {
    blocks: HashMap<usize, Array2<f64>>,
}

impl BlockStore {
    pub fn new() -> Self {
        BlockStore {
            blocks: HashMap::new(),
        }
    }

    /// Allocates a zeroed block for every key in `keys`, sized from the
    /// supernode partition.
    pub fn zeros_for(
        keys: impl IntoIterator<Item = usize>,
        supernodes: &SupernodeSet,
        nrhs: usize,
    ) -> Self {
        let mut blocks = HashMap::new();
        for k in keys {
            blocks.insert(k, Array2::zeros((supernodes.size(k), nrhs)));
        }
        BlockStore { blocks }
    }

    pub fn get(&self, k: usize) -> Option<&Array2<f64>> {
        self.blocks.get(&k)
    }

    pub fn get_mut(&mut self, k: usize) -> Option<&mut Array2<f64>> {
        self.blocks.get_mut(&k)
    }

    pub fn insert(&mut self, k: usize, block: Array2<f64>) {
        self.blocks.insert(k, block);
    }

    pub fn contains(&self, k: usize) -> bool {
        self.blocks.contains_key(&k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&usize, &Array2<f64>)> {
        self.blocks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_for_allocates_one_block_per_key_sized_from_supernodes() {
        let sup = SupernodeSet::from_sizes(vec![2, 3]);
        let store = BlockStore::zeros_for([0, 1], &sup, 2);
        assert_eq!(store.get(0).unwrap().dim(), (2, 2));
        assert_eq!(store.get(1).unwrap().dim(), (3, 2));
        assert!(store.get(2).is_none());
    }

    #[test]
    fn insert_and_contains_round_trip() {
        let mut store = BlockStore::new();
        assert!(!store.contains(5));
        store.insert(5, Array2::zeros((1, 1)));
        assert!(store.contains(5));
    }
}
