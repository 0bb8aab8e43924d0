//! Dense block kernels: triangular solve (TRSM), multiply-accumulate
//! (GEMM), and triangular inversion (`spec.md` §4.6). These are
//! sequential on a single process; the solver's parallelism is across
//! processes and independent supernodes, never inside a kernel call.
//!
//! `spec.md` treats an external BLAS-equivalent as assumed
//! infrastructure; these are direct Rust implementations over
//! `ndarray::Array2<f64>` rather than FFI bindings, since no system
//! BLAS is available to this workspace.

use crate::error::{SolveError, SolveResult};
use ndarray::{s, Array2, ArrayView2, ArrayViewMut2};

/// Selects between "multiply by precomputed inverse" (GEMM) and
/// "solve in place" (TRSM) at sweep time — the source's `Llu->inv`
/// flag, kept as a first-class runtime choice (`SPEC_FULL.md` §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolveMethod {
    #[default]
    Gemm,
    Trsm,
}

/// Solves `L * X = alpha * B` in place for `X`, where `l` is unit
/// lower triangular (diagonal entries are implicitly 1, per
/// `spec.md` §3's "unit-lower L_{k,k} part").
pub fn trsm_lower_unit(l: ArrayView2<f64>, mut x: ArrayViewMut2<f64>, alpha: f64) {
    let n = l.nrows();
    let nrhs = x.ncols();
    if alpha != 1.0 {
        x.mapv_inplace(|v| v * alpha);
    }
    for i in 0..n {
        for j in 0..nrhs {
            let mut acc = x[[i, j]];
            for p in 0..i {
                acc -= l[[i, p]] * x[[p, j]];
            }
            x[[i, j]] = acc;
        }
    }
}

/// Solves `U * X = alpha * B` in place for `X`, where `u` is (general,
/// non-unit) upper triangular.
pub fn trsm_upper(u: ArrayView2<f64>, mut x: ArrayViewMut2<f64>, alpha: f64) {
    let n = u.nrows();
    let nrhs = x.ncols();
    if alpha != 1.0 {
        x.mapv_inplace(|v| v * alpha);
    }
    for i in (0..n).rev() {
        for j in 0..nrhs {
            let mut acc = x[[i, j]];
            for p in (i + 1)..n {
                acc -= u[[i, p]] * x[[p, j]];
            }
            x[[i, j]] = acc / u[[i, i]];
        }
    }
}

/// Below this row count, thread dispatch overhead dwarfs the work in a
/// single panel update; most supernodes in this solver are small.
#[cfg(feature = "rayon-kernels")]
const PARALLEL_ROW_THRESHOLD: usize = 64;

/// `C := alpha * A * B + beta * C`, the one GEMM shape the sweeps need:
/// off-diagonal updates into LSUM and inverse-times-vector at a solved
/// diagonal. Sequential by default; with the `rayon-kernels` feature,
/// large panels split their independent output rows across a thread
/// pool (`spec.md` §5 — this parallelism is local to one process and
/// observes no other process's state).
pub fn gemm(alpha: f64, a: ArrayView2<f64>, b: ArrayView2<f64>, beta: f64, mut c: ArrayViewMut2<f64>) {
    debug_assert_eq!(a.ncols(), b.nrows());
    debug_assert_eq!((a.nrows(), b.ncols()), c.dim());
    if beta != 1.0 {
        c.mapv_inplace(|v| v * beta);
    }

    #[cfg(feature = "rayon-kernels")]
    {
        if a.nrows() >= PARALLEL_ROW_THRESHOLD {
            gemm_rows_parallel(alpha, a, b, c);
            return;
        }
    }
    gemm_rows_sequential(alpha, a, b, c.view_mut());
}

fn gemm_rows_sequential(alpha: f64, a: ArrayView2<f64>, b: ArrayView2<f64>, mut c: ArrayViewMut2<f64>) {
    for i in 0..a.nrows() {
        for k in 0..a.ncols() {
            let aik = alpha * a[[i, k]];
            if aik == 0.0 {
                continue;
            }
            for j in 0..b.ncols() {
                c[[i, j]] += aik * b[[k, j]];
            }
        }
    }
}

/// Each output row of `C` depends only on the matching row of `A` and
/// all of `B`, so rows are an embarrassingly parallel split — the same
/// shape of independence the teacher exploits with `par_iter` over
/// tree leaves (`fmm/src/field_translation.rs`).
#[cfg(feature = "rayon-kernels")]
fn gemm_rows_parallel(alpha: f64, a: ArrayView2<f64>, b: ArrayView2<f64>, mut c: ArrayViewMut2<f64>) {
    use ndarray::{Axis, Zip};

    Zip::from(c.axis_iter_mut(Axis(0)))
        .and(a.axis_iter(Axis(0)))
        .par_for_each(|mut crow, arow| {
            for k in 0..arow.len() {
                let aik = alpha * arow[k];
                if aik == 0.0 {
                    continue;
                }
                let brow = b.row(k);
                for j in 0..crow.len() {
                    crow[j] += aik * brow[j];
                }
            }
        });
}

/// Computes the dense inverse of a unit-lower triangular matrix into a
/// fresh buffer, by forward-solving each unit column of the identity.
pub fn invert_unit_lower(l: ArrayView2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut inv = Array2::<f64>::zeros((n, n));
    for col in 0..n {
        let mut e = Array2::<f64>::zeros((n, 1));
        e[[col, 0]] = 1.0;
        trsm_lower_unit(l, e.view_mut(), 1.0);
        inv.slice_mut(s![.., col]).assign(&e.column(0));
    }
    inv
}

/// Computes the dense inverse of an upper triangular matrix into a
/// fresh buffer, detecting a singular (zero or near-zero) diagonal
/// entry rather than dividing by it (`spec.md` §7 "Singular-diagonal").
pub fn invert_upper(u: ArrayView2<f64>, supernode: usize) -> SolveResult<Array2<f64>> {
    let n = u.nrows();
    for i in 0..n {
        if u[[i, i]].abs() < f64::EPSILON {
            return Err(SolveError::SingularDiagonal { supernode });
        }
    }
    let mut inv = Array2::<f64>::zeros((n, n));
    for col in 0..n {
        let mut e = Array2::<f64>::zeros((n, 1));
        e[[col, 0]] = 1.0;
        trsm_upper(u, e.view_mut(), 1.0);
        inv.slice_mut(s![.., col]).assign(&e.column(0));
    }
    Ok(inv)
}
