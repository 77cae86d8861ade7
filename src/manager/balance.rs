//! Balance (load redistribution, spec.md §4.8), grounded on
//! `includes/core/manager/BalanceManager.h`.
//!
//! Structure and payload travel as two parallel self-delimiting `f64`
//! streams, one `alltoallv` call each, at leaf granularity: every sent
//! cell carries its own `CellId::Plain` length prefix rather than the
//! coarser "first id + compressed run of levels" layout spec.md
//! sketches for a contiguous subtree. [`crate::utils::compression`]
//! still implements that general bit-packed encoding for cases that
//! need it; this manager's cross-process wire format just doesn't need
//! it because a balance round only ever moves whole owned leaves, never
//! an unsplit interior cell.

use log::debug;

use crate::core::cell::CellRef;
use crate::core::cell_id::{CellId, CellIdManager, OrderPath};
use crate::core::forest::Forest;
use crate::core::indicator::Ownership;
use crate::core::sfc::iterator::{order_path_for_cell, ForestIterator};
use crate::core::sfc::SpaceFillingCurve;
use crate::parallel::collective::Collective;
use crate::payload::{CellPayload, ExtrapolateFn};
use crate::utils::helpers::{prefix_sums, target_process, total_load};

/// Result of spec.md §4.8 step 1-3: the global load prefix `S` and the
/// target prefix a balanced distribution would have.
#[derive(Debug, Clone)]
pub struct BalanceAssessment {
    pub total_load: f64,
    /// `S`: cumulative owned load through each rank, globally visible.
    pub prefix: Vec<f64>,
    /// `(p+1)/nProc * total_load` for each rank `p`.
    pub target_prefix: Vec<f64>,
}

impl BalanceAssessment {
    /// `max_p |S_p - target_prefix[p]| / total_load` (spec.md §4.8 step 2).
    pub fn max_relative_deviation(&self) -> f64 {
        if self.total_load == 0.0 {
            return 0.0;
        }
        self.prefix
            .iter()
            .zip(&self.target_prefix)
            .map(|(s, t)| (s - t).abs() / self.total_load)
            .fold(0.0, f64::max)
    }

    pub fn is_load_balancing_needed(&self, max_pct_unbalance: f64) -> bool {
        self.max_relative_deviation() > max_pct_unbalance
    }
}

fn owned_leaf_load<P: CellPayload>(forest: &Forest<P>) -> f64 {
    let payloads: Vec<P> = forest
        .all_leaves()
        .filter(|&c| forest.indicator(c).ownership() == Ownership::ThisProc)
        .map(|c| forest.payload(c).cloned().unwrap_or_default())
        .collect();
    total_load(&payloads)
}

/// Spec.md §4.8 steps 1-3.
pub fn assess<P: CellPayload>(forest: &Forest<P>, collective: &dyn Collective) -> BalanceAssessment {
    let loads = collective.allgather_scalar(owned_leaf_load(forest));
    let total: f64 = loads.iter().sum();
    let n = loads.len();
    let prefix = prefix_sums(&loads);
    let target_prefix = (0..n).map(|p| (p + 1) as f64 * total / n as f64).collect();
    BalanceAssessment { total_load: total, prefix, target_prefix }
}

fn encode_structure<C: SpaceFillingCurve, P: CellPayload>(sfc: &C, forest: &Forest<P>, manager: &CellIdManager, cell: CellRef) -> Vec<f64> {
    let path = order_path_for_cell(sfc, forest, cell);
    let CellId::Plain(words) = manager.order_path_to_id_plain(&path) else {
        unreachable!("order_path_to_id_plain always returns CellId::Plain")
    };
    words.into_iter().map(|w| w as f64).collect()
}

fn decode_structure_stream(words: &[f64]) -> Vec<OrderPath> {
    let mut paths = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let l = words[i].round() as usize;
        let entry_len = l + 2;
        paths.push(words[i + 1..i + entry_len].iter().map(|&w| w.round() as u32).collect());
        i += entry_len;
    }
    paths
}

fn encode_payload<P: CellPayload>(payload: &P) -> Vec<f64> {
    let data = payload.to_vector_of_data();
    let mut out = Vec::with_capacity(data.len() + 1);
    out.push(data.len() as f64);
    out.extend(data);
    out
}

fn decode_payload_stream<P: CellPayload>(words: &[f64]) -> Vec<P> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let n = words[i].round() as usize;
        out.push(P::from_vector_of_data(&words[i + 1..i + 1 + n]));
        i += n + 1;
    }
    out
}

/// [`load_balance`] with [`crate::constants::DEFAULT_MAX_PCT_UNBALANCE`]
/// as its threshold, for drivers that don't need a custom one.
pub fn load_balance_with_default_threshold<C: SpaceFillingCurve, P: CellPayload>(
    forest: &mut Forest<P>,
    sfc: &C,
    collective: &dyn Collective,
    extrapolate: &ExtrapolateFn<P>,
) -> bool {
    load_balance(forest, sfc, collective, crate::constants::DEFAULT_MAX_PCT_UNBALANCE, extrapolate)
}

/// Runs one balance round (spec.md §4.8 steps 4-8). Returns `false`
/// without touching the forest if no rebalancing is needed (the
/// idempotence property spec.md §8 asks for). `max_pct_unbalance` is the
/// threshold from [`BalanceAssessment::is_load_balancing_needed`].
pub fn load_balance<C: SpaceFillingCurve, P: CellPayload>(
    forest: &mut Forest<P>,
    sfc: &C,
    collective: &dyn Collective,
    max_pct_unbalance: f64,
    extrapolate: &ExtrapolateFn<P>,
) -> bool {
    let assessment = assess(forest, collective);
    debug!("load_balance: rank={} max_relative_deviation={:.4}", collective.rank(), assessment.max_relative_deviation());
    if !assessment.is_load_balancing_needed(max_pct_unbalance) {
        return false;
    }

    let rank = collective.rank();
    let n_processes = collective.size();
    let mut cumulative = if rank == 0 { 0.0 } else { assessment.prefix[rank - 1] };

    let manager = CellIdManager::new(forest.max_level(), forest.number_of_roots(), forest.direction_table().number_children());
    let mut cells_to_send: Vec<Vec<CellRef>> = vec![Vec::new(); n_processes];

    let mut it: ForestIterator<C> = ForestIterator::for_forest(sfc.clone(), forest);
    if it.to_owned_begin(forest, forest.max_level()) {
        loop {
            let cell = it.current_cell();
            cumulative += forest.payload(cell).map(|p| p.load(true)).unwrap_or(0.0);
            let destination = target_process(cumulative, &assessment.target_prefix);
            if destination != rank {
                cells_to_send[destination].push(cell);
            }
            if !it.owned_next(forest, forest.max_level()) {
                break;
            }
        }
    }

    let structure_msgs: Vec<Vec<f64>> =
        cells_to_send.iter().map(|cells| cells.iter().flat_map(|&c| encode_structure(sfc, forest, &manager, c)).collect()).collect();
    let payload_msgs: Vec<Vec<f64>> = cells_to_send
        .iter()
        .map(|cells| {
            cells
                .iter()
                .flat_map(|&c| encode_payload(&forest.payload(c).cloned().unwrap_or_default()))
                .collect()
        })
        .collect();

    let received_structure = collective.alltoallv(&structure_msgs);
    let received_payload = collective.alltoallv(&payload_msgs);

    let mut changed = cells_to_send.iter().any(|cells| !cells.is_empty());
    for cells in &cells_to_send {
        for &cell in cells {
            forest.indicator_mut(cell).set_to_other_proc();
        }
    }

    for (source_structure, source_payload) in received_structure.iter().zip(received_payload.iter()) {
        let paths = decode_structure_stream(source_structure);
        let payloads: Vec<P> = decode_payload_stream(source_payload);
        for (path, payload) in paths.into_iter().zip(payloads.into_iter()) {
            let id = manager.order_path_to_id_plain(&path);
            it.to_cell_id(forest, &id, true, extrapolate);
            let cell = it.current_cell();
            forest.set_payload(cell, payload);
            forest.indicator_mut(cell).set_to_this_proc();
            changed = true;
        }
    }

    let roots: Vec<CellRef> = forest.roots().iter().map(|r| r.cell).collect();
    for root in roots {
        forest.back_propagate_ownership(root);
    }

    collective.allreduce_any(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forest::Dims;
    use crate::core::sfc::morton::Morton;
    use crate::parallel::local::LocalCollective;
    use crate::parallel::threaded::ThreadedCollective;
    use crate::payload::{copy_extrapolate, Scalar};

    #[test]
    fn a_single_rank_never_needs_balancing() {
        let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 0, 0), 3);
        forest.add_root();
        let collective = LocalCollective;
        let sfc = Morton::xyz(1);
        assert!(!load_balance(&mut forest, &sfc, &collective, 0.01, &copy_extrapolate));
    }

    #[test]
    fn default_threshold_wrapper_matches_the_explicit_constant() {
        let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 0, 0), 3);
        forest.add_root();
        let collective = LocalCollective;
        let sfc = Morton::xyz(1);
        assert!(!load_balance_with_default_threshold(&mut forest, &sfc, &collective, &copy_extrapolate));
    }

    #[test]
    fn rebalances_load_carried_entirely_by_one_rank() {
        let n_processes = 3;
        let results: Vec<usize> = ThreadedCollective::run(n_processes, |collective| {
            let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 2, 0), 3);
            forest.add_root();
            let sfc = Morton::xyz(2);
            crate::manager::min_level::mesh_at_min_level_serial(&mut forest, 2, &copy_extrapolate);
            if collective.rank() == 1 {
                for cell in forest.all_leaves().collect::<Vec<_>>() {
                    forest.indicator_mut(cell).set_to_this_proc();
                }
            } else {
                for cell in forest.all_leaves().collect::<Vec<_>>() {
                    forest.indicator_mut(cell).set_to_other_proc();
                }
            }

            load_balance(&mut forest, &sfc, &collective, 0.01, &copy_extrapolate);
            forest.all_leaves().filter(|&c| forest.indicator(c).ownership() == Ownership::ThisProc).count()
        });

        let total: usize = results.iter().sum();
        assert_eq!(total, 16);
        let target = total / n_processes;
        for (rank, &owned) in results.iter().enumerate() {
            assert!(
                owned + 1 >= target && owned <= target + 2,
                "rank {rank} owned {owned} leaves, expected close to {target}"
            );
        }
    }
}
