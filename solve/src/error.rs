//! Error taxonomy for the solve engine, extending [`distrisolve_layout::LayoutError`]
//! with the sweep-specific failure modes of `spec.md` §7.

use distrisolve_layout::LayoutError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("illegal argument `{name}`: {reason}")]
    IllegalArgument {
        name: &'static str,
        reason: &'static str,
    },

    #[error("allocation failed for `{what}`")]
    Allocation { what: &'static str },

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("supernode {supernode} has a singular diagonal block")]
    SingularDiagonal { supernode: usize },

    #[error("a modification counter for local block {local_block} was re-entered after solving")]
    CounterReentry { local_block: usize },
}

impl SolveError {
    /// Maps this error onto the `info` code returned to the caller:
    /// negative for illegal arguments, per `spec.md` §6/§7.
    pub fn info_code(&self) -> i32 {
        match self {
            SolveError::IllegalArgument { .. } => -1,
            SolveError::SingularDiagonal { supernode } => 1 + *supernode as i32,
            _ => -2,
        }
    }
}

pub type SolveResult<T> = Result<T, SolveError>;
