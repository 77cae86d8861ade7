//! Collective primitives consumed by the managers (spec.md §6).

/// Reduction operator for [`Collective::allreduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Logical AND, used e.g. to check "has every rank converged".
    And,
    /// Sum, used for load totals and prefix sums.
    Sum,
    /// Minimum, used for conservative bounds.
    Min,
}

/// The set of collective operations a manager needs. Implementations
/// map these to a real message-passing library, or — as here — to a
/// trivial local copy (N=1) or a thread-simulated cluster (tests).
///
/// All methods are blocking: spec.md §5 states these are the only
/// suspension points in the system ("the only blocking points are the
/// collective calls").
pub trait Collective {
    /// This process's rank, `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Gather one scalar per rank into a vector ordered by rank, on
    /// every rank.
    fn allgather_scalar(&self, value: f64) -> Vec<f64>;

    /// Gather one variable-length vector per rank into a flat
    /// concatenation plus per-rank length, on every rank.
    fn allgatherv(&self, values: &[f64]) -> (Vec<f64>, Vec<usize>);

    /// Exchange one scalar per destination rank; returns one scalar per
    /// source rank.
    fn alltoall(&self, values: &[f64]) -> Vec<f64>;

    /// Exchange one variable-length vector per destination rank;
    /// returns one vector per source rank, in sender-relative order
    /// (spec.md §5, "Exchanges preserve sender-relative order within
    /// each (sender,receiver) pair").
    fn alltoallv(&self, values: &[Vec<f64>]) -> Vec<Vec<f64>>;

    /// Reduce one scalar per rank to a single value, visible on every
    /// rank.
    fn allreduce(&self, value: f64, op: ReduceOp) -> f64;

    /// Broadcast: every rank but `root` receives the root's value.
    fn broadcast(&self, root: usize, value: Option<Vec<f64>>) -> Vec<f64>;

    /// Gather one scalar per rank into a vector ordered by rank,
    /// visible only on `root`.
    fn gather(&self, root: usize, value: f64) -> Option<Vec<f64>>;
}

impl dyn Collective + '_ {
    /// Convenience wrapper: `allreduce` with [`ReduceOp::Sum`] over a
    /// `bool`, used throughout the managers to decide "did any rank
    /// change anything" (spec.md §4.6, "reduced with logical OR" — a
    /// sum greater than zero is equivalent to an OR across 0/1 values).
    pub fn allreduce_any(&self, value: bool) -> bool {
        self.allreduce(if value { 1.0 } else { 0.0 }, ReduceOp::Sum) > 0.0
    }
}
