//! The per-call solve engine: dense block kernels, modification
//! counters, the wire format the sweeps speak, and the forward/backward
//! self-scheduling loops themselves.
//!
//! Everything here is per-call state (`spec.md` §9: "never global
//! state"); the factor-resident data it reads — the supernode
//! partition, local panels, and communication trees — lives in
//! `distrisolve-layout` and is passed in by reference.

pub mod backward;
pub mod blockstore;
pub mod counters;
pub mod error;
pub mod forward;
pub mod kernels;
pub mod precompute;
pub mod wire;

pub use backward::backward_solve;
pub use blockstore::BlockStore;
pub use counters::{ModCounters, PendingMessages, SOLVED};
pub use error::{SolveError, SolveResult};
pub use forward::forward_solve;
pub use kernels::SolveMethod;
pub use precompute::precompute_diagonal_inverses;
