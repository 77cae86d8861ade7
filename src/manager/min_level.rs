//! MinLevelMesh (spec.md §4.5), grounded on
//! `tamra/includes/core/manager/MinLevelMeshManager.h`.

use log::debug;

use crate::core::cell::CellRef;
use crate::core::cell_id::CellIdManager;
use crate::core::forest::Forest;
use crate::core::sfc::iterator::ForestIterator;
use crate::core::sfc::SpaceFillingCurve;
use crate::payload::{CellPayload, ExtrapolateFn};

/// Recursively splits every leaf below `min_level` until the forest is
/// uniformly at `min_level` (spec.md §4.5, the serial variant). Safe to
/// call again on an already-uniform forest: it is then a no-op.
pub fn mesh_at_min_level_serial<P: CellPayload>(forest: &mut Forest<P>, min_level: u32, extrapolate: &ExtrapolateFn<P>) {
    debug!("mesh_at_min_level_serial: min_level={min_level}");
    loop {
        let candidates: Vec<CellRef> = forest.all_leaves().filter(|&c| forest.level(c) < min_level).collect();
        if candidates.is_empty() {
            break;
        }
        for cell in candidates {
            if forest.is_leaf(cell) && forest.level(cell) < min_level {
                if forest.is_root(cell) {
                    forest.split_root(cell, extrapolate);
                } else {
                    forest.split(cell, extrapolate);
                }
            }
        }
    }
}

/// Partitioned variant: each process computes its equal-partition
/// fences at `min_level` across the whole forest and materializes only
/// the leaves inside its own fence range via
/// [`ForestIterator::to_cell_id`], avoiding the full uniform tree on
/// every rank (spec.md §4.5). A final back-propagation pass (spec.md
/// §4.3, §4.5) marks every ancestor of a materialized leaf as
/// `ThisProc`.
pub fn mesh_at_min_level_partitioned<C: SpaceFillingCurve, P: CellPayload>(
    forest: &mut Forest<P>,
    sfc: &C,
    min_level: u32,
    rank: usize,
    n_processes: usize,
    extrapolate: &ExtrapolateFn<P>,
) {
    debug!("mesh_at_min_level_partitioned: rank={rank}/{n_processes} min_level={min_level}");
    let manager = CellIdManager::new(forest.max_level(), forest.number_of_roots(), forest.direction_table().number_children());
    let fences = manager.get_equal_partitions(min_level, n_processes);
    let lo = fences[rank].clone();
    let hi = &fences[rank + 1];

    let mut it: ForestIterator<C> = ForestIterator::for_forest(sfc.clone(), forest);
    let mut path = lo;
    let mut landed: Vec<CellRef> = Vec::new();
    while manager.cell_id_lt(&path, hi) {
        let id = manager.order_path_to_id_plain(&path);
        it.to_cell_id(forest, &id, true, extrapolate);
        landed.push(it.current_cell());
        path = manager.increment_order_path(&path);
    }

    // `to_cell_id(..., create=true)` materializes whole octs (all `2^d`
    // siblings) plus any 2:1 cascade cells, every one of which inherits
    // its parent's indicator -- which for a fresh root is `ThisProc`
    // (spec.md §3, §4.5). Leaves outside this rank's fence range that
    // got created as a side effect must not stay `ThisProc`: reset every
    // leaf to `OtherProc` first, then re-mark only the leaves this rank
    // actually landed on, mirroring `MinLevelMeshManager.h`'s
    // created-but-unowned -> `OtherProc` initialization.
    for cell in forest.all_leaves().collect::<Vec<_>>() {
        forest.indicator_mut(cell).set_to_other_proc();
    }
    for cell in landed {
        forest.indicator_mut(cell).set_to_this_proc();
    }

    let roots: Vec<CellRef> = forest.roots().iter().map(|r| r.cell).collect();
    for root in roots {
        forest.back_propagate_ownership(root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forest::Dims;
    use crate::core::sfc::morton::Morton;
    use crate::payload::{copy_extrapolate, Scalar};

    #[test]
    fn serial_mesh_reaches_min_level_uniformly() {
        let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 2, 0), 4);
        forest.add_root();
        mesh_at_min_level_serial(&mut forest, 2, &copy_extrapolate);
        assert_eq!(forest.leaf_count(), 16);
        assert!(forest.all_leaves().all(|c| forest.level(c) == 2));
    }

    #[test]
    fn serial_mesh_is_idempotent() {
        let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 2, 0), 4);
        forest.add_root();
        mesh_at_min_level_serial(&mut forest, 2, &copy_extrapolate);
        let before = forest.leaf_count();
        mesh_at_min_level_serial(&mut forest, 2, &copy_extrapolate);
        assert_eq!(forest.leaf_count(), before);
    }

    #[test]
    fn partitioned_mesh_covers_the_whole_forest_across_ranks() {
        let n_processes = 3;
        let mut total_owned = 0usize;
        for rank in 0..n_processes {
            let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 2, 0), 3);
            forest.add_root();
            let sfc = Morton::xyz(2);
            mesh_at_min_level_partitioned(&mut forest, &sfc, 2, rank, n_processes, &copy_extrapolate);
            let owned = forest.all_leaves().filter(|&c| forest.indicator(c).ownership() == crate::core::indicator::Ownership::ThisProc).count();
            assert!((5..=6).contains(&owned), "rank {rank} owned {owned} leaves");
            total_owned += owned;
        }
        assert_eq!(total_owned, 16);
    }
}
