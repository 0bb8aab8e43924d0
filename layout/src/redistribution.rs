//! Pre/post scatter of B and X between the application's 1D row
//! distribution and the solver's 2D block distribution (`spec.md`
//! §4.1), grounded directly on `pdReDistribute_B_to_X`/
//! `pdReDistribute_X_to_B` in `examples/original_source/SRC/pdgstrs.c`:
//! one `MPI_Alltoallv` for the permuted row indices and one for the
//! numerical payload, never the commented-out point-to-point
//! alternative.

use crate::error::{LayoutError, LayoutResult};
use crate::grid::ProcessGrid;
use crate::supernode::SupernodeSet;
use itertools::Itertools;
use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

/// Row and column permutation vectors produced by symbolic analysis,
/// consumed read-only here.
pub struct Permutations<'a> {
    pub perm_r: &'a [usize],
    pub perm_c: &'a [usize],
}

/// The application's row-to-process mapping: each process owns a
/// contiguous range `[fst_row, fst_row + m_loc)` of the global rows
/// (`spec.md` §3). Built once via an all-gather of every process's
/// local range, then used to invert X->B ownership during
/// `gather_x_to_b`.
pub struct RowOwnerMap {
    /// `(fst_row, m_loc)` per process rank, in rank order.
    ranges: Vec<(usize, usize)>,
}

impl RowOwnerMap {
    pub fn gather(grid: &ProcessGrid, fst_row: usize, m_loc: usize) -> LayoutResult<Self> {
        let procs = grid.nprow() * grid.npcol();
        let mine = [fst_row as i64, m_loc as i64];
        let mut all = vec![0i64; procs * 2];
        grid.world_comm().all_gather_into(&mine, &mut all);
        let ranges = all
            .chunks_exact(2)
            .map(|c| (c[0] as usize, c[1] as usize))
            .collect();
        Ok(RowOwnerMap { ranges })
    }

    /// Locates the owning process of global row `row` by scanning the
    /// gathered contiguous ranges.
    pub fn owner_of(&self, row: usize) -> usize {
        self.ranges
            .iter()
            .position(|&(fst, m_loc)| row >= fst && row < fst + m_loc)
            .expect("row falls within some process's local range")
    }
}

/// Per-peer send/receive counts and displacements for one direction of
/// the B<->X redistribution, plus the packed destination/offset per
/// local row needed to build the actual send buffers at call time.
pub struct RedistributionPlan {
    procs: usize,
    send_counts: Vec<i32>,
    send_displs: Vec<i32>,
    recv_counts: Vec<i32>,
    recv_displs: Vec<i32>,
    /// For each local row `i` (0-indexed within `[fst_row, fst_row+m_loc)`),
    /// the destination process and the permuted global row index.
    dest_and_row: Vec<(usize, usize)>,
    row_owners: RowOwnerMap,
}

impl RedistributionPlan {
    /// Classifies every local row by `pi_c(pi_r(i))` then locates its
    /// supernode and diagonal owner, building the send-side layout for
    /// `ScatterBToX` (`spec.md` §4.1).
    pub fn for_scatter(
        grid: &ProcessGrid,
        supernodes: &SupernodeSet,
        perm: &Permutations,
        fst_row: usize,
        m_loc: usize,
    ) -> LayoutResult<Self> {
        let procs = grid.nprow() * grid.npcol();
        let mut send_counts = vec![0i32; procs];
        let mut dest_and_row = Vec::with_capacity(m_loc);

        for i in 0..m_loc {
            let global_row = fst_row + i;
            let pr = *perm
                .perm_r
                .get(global_row)
                .ok_or(LayoutError::IllegalArgument {
                    name: "perm_r",
                    reason: "row permutation shorter than N",
                })?;
            let permuted = *perm
                .perm_c
                .get(pr)
                .ok_or(LayoutError::IllegalArgument {
                    name: "perm_c",
                    reason: "column permutation shorter than N",
                })?;
            let k = supernodes.block_containing(permuted);
            let owner = grid.diag_owner(k) as usize;
            send_counts[owner] += 1;
            dest_and_row.push((owner, permuted));
        }

        let row_owners = RowOwnerMap::gather(grid, fst_row, m_loc)?;
        Self::from_send_counts(grid, procs, send_counts, dest_and_row, row_owners)
    }

    fn from_send_counts(
        grid: &ProcessGrid,
        procs: usize,
        send_counts: Vec<i32>,
        dest_and_row: Vec<(usize, usize)>,
        row_owners: RowOwnerMap,
    ) -> LayoutResult<Self> {
        let send_displs = prefix_sum(&send_counts);

        let mut recv_counts = vec![0i32; procs];
        grid.world_group_all_to_all(&send_counts, &mut recv_counts)?;
        let recv_displs = prefix_sum(&recv_counts);

        Ok(RedistributionPlan {
            procs,
            send_counts,
            send_displs,
            recv_counts,
            recv_displs,
            dest_and_row,
            row_owners,
        })
    }

    /// Packs `(permuted_index, value-row)` pairs into per-destination
    /// buffers, all-to-alls the indices and the values separately, and
    /// writes each received value into the `x` slot at the offset
    /// relative to `fst(k)`. `x` is addressed with column stride
    /// `x_local_width` — the caller's own local footprint (every
    /// message this process receives here lands on a block it is the
    /// diagonal owner of), not the global matrix order.
    pub fn scatter_b_to_x(
        &self,
        grid: &ProcessGrid,
        supernodes: &SupernodeSet,
        b: &[f64],
        ldb: usize,
        nrhs: usize,
        x: &mut [f64],
        x_local_width: usize,
        x_block_offsets: &dyn Fn(usize) -> usize,
    ) -> LayoutResult<()> {
        let total_send: i32 = self.send_counts.iter().sum();
        let total_recv: i32 = self.recv_counts.iter().sum();

        let mut send_rows = vec![0i64; total_send as usize];
        let mut send_vals = vec![0f64; total_send as usize * nrhs];
        let mut cursor = self.send_displs.clone();

        for (i, &(dest, permuted)) in self.dest_and_row.iter().enumerate() {
            let slot = cursor[dest] as usize;
            send_rows[slot] = permuted as i64;
            for j in 0..nrhs {
                send_vals[slot * nrhs + j] = b[i + j * ldb];
            }
            cursor[dest] += 1;
        }

        let mut recv_rows = vec![0i64; total_recv as usize];
        all_to_all_v(
            grid.world_comm(),
            &send_rows,
            &self.send_counts,
            &self.send_displs,
            &mut recv_rows,
            &self.recv_counts,
            &self.recv_displs,
        )?;

        let send_vals_counts_nrhs = scale(&self.send_counts, nrhs as i32);
        let send_vals_displs_nrhs = scale(&self.send_displs, nrhs as i32);
        let recv_vals_counts_nrhs = scale(&self.recv_counts, nrhs as i32);
        let recv_vals_displs_nrhs = scale(&self.recv_displs, nrhs as i32);
        let mut recv_vals = vec![0f64; total_recv as usize * nrhs];
        all_to_all_v(
            grid.world_comm(),
            &send_vals,
            &send_vals_counts_nrhs,
            &send_vals_displs_nrhs,
            &mut recv_vals,
            &recv_vals_counts_nrhs,
            &recv_vals_displs_nrhs,
        )?;

        for (slot, &permuted) in recv_rows.iter().enumerate() {
            let permuted = permuted as usize;
            let k = supernodes.block_containing(permuted);
            let base = x_block_offsets(k) + (permuted - supernodes.fst_col(k));
            for j in 0..nrhs {
                x[base + j * x_local_width] = recv_vals[slot * nrhs + j];
            }
        }

        Ok(())
    }

    /// Symmetric inverse of [`scatter_b_to_x`]: on diagonal owners,
    /// unpack solved X into per-destination buffers keyed by the
    /// inverse row-ownership map, all-to-all, then write into the
    /// caller's B using `(received_row - fst_row)` as offset. `x` uses
    /// the same `x_local_width` column stride as `scatter_b_to_x`.
    pub fn gather_x_to_b(
        &self,
        grid: &ProcessGrid,
        supernodes: &SupernodeSet,
        x: &[f64],
        x_block_offsets: &dyn Fn(usize) -> usize,
        x_local_width: usize,
        nrhs: usize,
        fst_row: usize,
        ldb: usize,
        b: &mut [f64],
    ) -> LayoutResult<()> {
        // This direction runs the same all-to-all with sender and
        // receiver roles swapped relative to the scatter plan.
        let total_send: i32 = self.recv_counts.iter().sum();
        let total_recv: i32 = self.send_counts.iter().sum();

        let mut send_rows = vec![0i64; total_send as usize];
        let mut send_vals = vec![0f64; total_send as usize * nrhs];
        let mut cursor = self.recv_displs.clone();

        // Walk every diagonally-owned block this process holds in X
        // and re-derive the destination process for each row from the
        // row-ownership map, mirroring the source's inverse traversal
        // in `pdReDistribute_X_to_B`.
        for (k, fst) in (0..supernodes.nsup()).map(|k| (k, supernodes.fst_col(k))) {
            if !grid.is_diag_owner(k) {
                continue;
            }
            let base = x_block_offsets(k);
            for local_col in 0..supernodes.size(k) {
                let permuted = fst + local_col;
                let dest = self.row_owners.owner_of(permuted);
                let slot = cursor[dest] as usize;
                send_rows[slot] = permuted as i64;
                for j in 0..nrhs {
                    send_vals[slot * nrhs + j] = x[base + local_col + j * x_local_width];
                }
                cursor[dest] += 1;
            }
        }

        let mut recv_rows = vec![0i64; total_recv as usize];
        all_to_all_v(
            grid.world_comm(),
            &send_rows,
            &self.recv_counts,
            &self.recv_displs,
            &mut recv_rows,
            &self.send_counts,
            &self.send_displs,
        )?;

        let send_nrhs = scale(&self.recv_counts, nrhs as i32);
        let sdispl_nrhs = scale(&self.recv_displs, nrhs as i32);
        let recv_nrhs = scale(&self.send_counts, nrhs as i32);
        let rdispl_nrhs = scale(&self.send_displs, nrhs as i32);
        let mut recv_vals = vec![0f64; total_recv as usize * nrhs];
        all_to_all_v(
            grid.world_comm(),
            &send_vals,
            &send_nrhs,
            &sdispl_nrhs,
            &mut recv_vals,
            &recv_nrhs,
            &rdispl_nrhs,
        )?;

        for (slot, &row) in recv_rows.iter().enumerate() {
            let local_row = row as usize - fst_row;
            for j in 0..nrhs {
                b[local_row + j * ldb] = recv_vals[slot * nrhs + j];
            }
        }

        Ok(())
    }

    pub fn procs(&self) -> usize {
        self.procs
    }
}

fn prefix_sum(counts: &[i32]) -> Vec<i32> {
    let mut displs = Vec::with_capacity(counts.len());
    let mut acc = 0i32;
    for &c in counts {
        displs.push(acc);
        acc += c;
    }
    displs
}

fn scale(counts: &[i32], factor: i32) -> Vec<i32> {
    counts.iter().map(|c| c * factor).collect_vec()
}


fn all_to_all_v(
    comm: &SimpleCommunicator,
    send: &[impl Equivalence],
    send_counts: &[i32],
    send_displs: &[i32],
    recv: &mut [impl Equivalence],
    recv_counts: &[i32],
    recv_displs: &[i32],
) -> LayoutResult<()>
where
{
    let send_partition = Partition::new(send, send_counts, send_displs);
    let mut recv_partition = PartitionMut::new(recv, recv_counts, recv_displs);
    comm.all_to_all_varcount_into(&send_partition, &mut recv_partition);
    Ok(())
}

impl ProcessGrid {
    /// All-to-all of equal-sized per-peer scalars (here: send counts),
    /// used to derive receive counts before the real payload exchange.
    fn world_group_all_to_all(&self, send: &[i32], recv: &mut [i32]) -> LayoutResult<()> {
        self.world_comm().all_to_all_into(send, recv);
        Ok(())
    }
}
