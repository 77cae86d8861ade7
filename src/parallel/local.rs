//! The N=1 collective implementation.

use super::collective::{Collective, ReduceOp};

/// Single-process stand-in for a cluster of one. Every collective
/// degenerates to copying the local buffer, per spec.md §5's mandate
/// that the system "works correctly at N=1 by short-circuiting every
/// collective to a no-op".
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCollective;

impl Collective for LocalCollective {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn allgather_scalar(&self, value: f64) -> Vec<f64> {
        vec![value]
    }

    fn allgatherv(&self, values: &[f64]) -> (Vec<f64>, Vec<usize>) {
        (values.to_vec(), vec![values.len()])
    }

    fn alltoall(&self, values: &[f64]) -> Vec<f64> {
        assert_eq!(values.len(), 1, "alltoall on a single rank expects exactly one destination");
        values.to_vec()
    }

    fn alltoallv(&self, values: &[Vec<f64>]) -> Vec<Vec<f64>> {
        assert_eq!(values.len(), 1, "alltoallv on a single rank expects exactly one destination");
        values.to_vec()
    }

    fn allreduce(&self, value: f64, _op: ReduceOp) -> f64 {
        value
    }

    fn broadcast(&self, root: usize, value: Option<Vec<f64>>) -> Vec<f64> {
        assert_eq!(root, 0, "single-rank broadcast root must be rank 0");
        value.expect("the single rank is always its own broadcast root")
    }

    fn gather(&self, root: usize, value: f64) -> Option<Vec<f64>> {
        assert_eq!(root, 0, "single-rank gather root must be rank 0");
        Some(vec![value])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_collective_is_a_local_copy() {
        let c = LocalCollective;
        assert_eq!(c.allgather_scalar(4.2), vec![4.2]);
        assert_eq!(c.allreduce(7.0, ReduceOp::Sum), 7.0);
        assert_eq!(c.broadcast(0, Some(vec![1.0, 2.0])), vec![1.0, 2.0]);
        assert_eq!(c.gather(0, 9.0), Some(vec![9.0]));
    }
}
