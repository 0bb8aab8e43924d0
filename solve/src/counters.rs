//! Modification counters (`spec.md` §3): `fmod`/`frecv` gate the
//! forward sweep, `bmod`/`brecv` gate the backward sweep. All four are
//! owned by a single `Solver` instance for a single call — never
//! global state (`spec.md` §9).

use crate::error::{SolveError, SolveResult};

/// Terminal value written once a local block-row has solved; it must
/// never be re-entered (`spec.md` §3 invariant).
pub const SOLVED: i64 = -1;

/// A pair of modification counters (either fmod/frecv or bmod/brecv)
/// for every locally owned block-row.
#[derive(Debug, Clone)]
pub struct ModCounters {
    /// Remaining local block updates before the diagonal solve may fire.
    pub mod_count: Vec<i64>,
    /// Remaining peer partial-sum contributions before the diagonal
    /// solve may fire.
    pub recv_count: Vec<i64>,
}

impl ModCounters {
    pub fn new(mod_template: &[i64], recv_count: Vec<i64>) -> Self {
        ModCounters {
            mod_count: mod_template.to_vec(),
            recv_count,
        }
    }

    /// True exactly when local block-row `lk` may run its diagonal
    /// solve right now: both counters are at zero and it has not
    /// already solved.
    pub fn is_solvable(&self, lk: usize) -> bool {
        self.mod_count[lk] == 0 && self.recv_count[lk] == 0
    }

    pub fn is_solved(&self, lk: usize) -> bool {
        self.mod_count[lk] == SOLVED
    }

    /// Marks `lk` solved; enforces the at-most-once invariant.
    pub fn mark_solved(&mut self, lk: usize) -> SolveResult<()> {
        if self.mod_count[lk] == SOLVED {
            return Err(SolveError::CounterReentry { local_block: lk });
        }
        self.mod_count[lk] = SOLVED;
        Ok(())
    }

    /// Decrements the local-update counter for `lk` after an off-diagonal
    /// block contributes to it. No-op once solved.
    pub fn decrement_mod(&mut self, lk: usize) {
        if self.mod_count[lk] > 0 {
            self.mod_count[lk] -= 1;
        }
    }

    /// Decrements the peer-contribution counter for `lk`. No-op once solved.
    pub fn decrement_recv(&mut self, lk: usize) {
        if self.recv_count[lk] > 0 {
            self.recv_count[lk] -= 1;
        }
    }
}

/// Global message-expectation counters driving the service loop's
/// termination condition (`spec.md` §4.3 step 2): the sweep runs while
/// either is nonzero.
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingMessages {
    /// Number of X-broadcast messages still expected anywhere locally.
    pub nrecvx: i64,
    /// Number of LSUM-reduction messages still expected anywhere locally.
    pub nrecvmod: i64,
}

impl PendingMessages {
    pub fn is_done(&self) -> bool {
        self.nrecvx == 0 && self.nrecvmod == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solvable_exactly_when_both_counters_zero() {
        let mut c = ModCounters::new(&[1, 0], vec![0, 1]);
        assert!(!c.is_solvable(0));
        assert!(!c.is_solvable(1));
        c.decrement_mod(0);
        c.decrement_recv(1);
        assert!(c.is_solvable(0));
        assert!(c.is_solvable(1));
    }

    #[test]
    fn mark_solved_rejects_reentry() {
        let mut c = ModCounters::new(&[0], vec![0]);
        c.mark_solved(0).unwrap();
        assert!(c.is_solved(0));
        assert!(matches!(
            c.mark_solved(0),
            Err(SolveError::CounterReentry { local_block: 0 })
        ));
    }

    #[test]
    fn decrements_never_go_negative() {
        let mut c = ModCounters::new(&[0], vec![0]);
        c.decrement_mod(0);
        c.decrement_recv(0);
        assert_eq!(c.mod_count[0], 0);
        assert_eq!(c.recv_count[0], 0);
    }

    #[test]
    fn pending_messages_done_only_when_both_drained() {
        let mut p = PendingMessages {
            nrecvx: 1,
            nrecvmod: 0,
        };
        assert!(!p.is_done());
        p.nrecvx = 0;
        assert!(p.is_done());
    }
}
