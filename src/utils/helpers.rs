//! Small numeric helpers shared by the managers, grounded on the
//! teacher's own `src/utils/helpers.rs`.

use rayon::prelude::*;

use crate::payload::CellPayload;

/// Running totals `[v0, v0+v1, v0+v1+v2, ...]`, used to turn per-rank
/// loads into the global prefix-sum vector `S` from spec.md §4.8.
pub fn prefix_sums(values: &[f64]) -> Vec<f64> {
    let mut running = 0.0;
    values
        .iter()
        .map(|v| {
            running += v;
            running
        })
        .collect()
}

/// The target process for a position in the global load order: the
/// first `p` whose `target_prefix[p]` is at or past `cumulative_load`.
pub fn target_process(cumulative_load: f64, target_prefix: &[f64]) -> usize {
    target_prefix
        .iter()
        .position(|&t| cumulative_load <= t + f64::EPSILON)
        .unwrap_or(target_prefix.len() - 1)
}

/// Sums `payload.load(true)` over a slice of leaf payloads, the shape
/// [`crate::manager::balance`]'s local load assessment needs (spec.md
/// §4.8 step 1, "each process sums `payload.getLoad(isLeaf=true)`
/// across its owned leaves"). Runs the per-leaf reduction over `rayon`'s
/// `par_iter`, since a rank's owned-leaf count can be large.
pub fn total_load<P: CellPayload>(payloads: &[P]) -> f64 {
    payloads.par_iter().map(|p| p.load(true)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_sums_accumulates() {
        assert_eq!(prefix_sums(&[1.0, 2.0, 3.0]), vec![1.0, 3.0, 6.0]);
    }

    #[test]
    fn target_process_picks_the_first_boundary_at_or_past_the_load() {
        let target_prefix = vec![3.0, 6.0, 9.0];
        assert_eq!(target_process(2.5, &target_prefix), 0);
        assert_eq!(target_process(3.0, &target_prefix), 0);
        assert_eq!(target_process(3.5, &target_prefix), 1);
        assert_eq!(target_process(9.0, &target_prefix), 2);
    }
}
