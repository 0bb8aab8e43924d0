//! Error taxonomy for the layout crate.
//!
//! Mirrors the taxonomy of `spec.md` §7 for the two failure modes this
//! crate can itself raise: illegal arguments are reported without side
//! effects, and communicator-split allocation failures are fatal. The
//! singular-diagonal case belongs to the solve engine (it only ever
//! arises while inverting a diagonal block, not while building the
//! layout) and is carried on `distrisolve_solve::SolveError` instead.

use thiserror::Error;

/// Errors raised while building or using the distributed layout.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("illegal argument `{name}`: {reason}")]
    IllegalArgument {
        name: &'static str,
        reason: &'static str,
    },

    #[error("allocation failed for `{what}`")]
    Allocation { what: &'static str },
}

pub type LayoutResult<T> = Result<T, LayoutError>;
