//! Coarsen (spec.md §4.7), grounded on
//! `tamra/includes/core/manager/CoarseManager.h`.

use log::debug;

use crate::core::cell::CellRef;
use crate::core::forest::Forest;
use crate::parallel::collective::Collective;
use crate::payload::{CellPayload, InterpolateFn};

/// Collapses every "candidate parent" — a non-leaf cell whose child oct
/// currently holds only leaves — found in the forest as it stands at
/// the start of this call (spec.md §4.7). Snapshotting candidates up
/// front, rather than recursing top-down and re-examining freshly
/// collapsed cells, is what gives the documented repeat-ability
/// guarantee: one call coarsens at most one level per eligible chain.
/// [`Forest::coarsen`] itself enforces the all-marked-`Coarsen` and
/// neighbor-2:1 preconditions; a candidate that fails either is a
/// silent no-op. Returns `true` iff at least one collapse occurred on
/// any process.
pub fn coarsen<P: CellPayload>(forest: &mut Forest<P>, min_level: u32, collective: &dyn Collective, interpolate: &InterpolateFn<P>) -> bool {
    debug!("coarsen: rank={} min_level={min_level}", collective.rank());
    let candidates: Vec<CellRef> = forest
        .all_cells()
        .filter(|&c| {
            !forest.is_leaf(c)
                && forest
                    .child_oct(c)
                    .map(|oct| forest.children_of(oct).iter().all(|&child| forest.is_leaf(child)))
                    .unwrap_or(false)
        })
        .collect();

    let mut changed = false;
    for cell in candidates {
        if forest.coarsen(cell, min_level, interpolate) {
            changed = true;
        }
    }

    collective.allreduce_any(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forest::Dims;
    use crate::parallel::local::LocalCollective;
    use crate::payload::{copy_extrapolate, first_child_interpolate, Scalar};

    #[test]
    fn coarsen_collapses_fully_marked_parents_and_reports_change() {
        let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 2, 0), 3);
        let (_, root) = forest.add_root();
        forest.split(root, &copy_extrapolate);
        for child in forest.children_of(forest.child_oct(root).unwrap()).to_vec() {
            forest.indicator_mut(child).set_to_coarsen();
        }

        let collective = LocalCollective;
        assert!(coarsen(&mut forest, 0, &collective, &first_child_interpolate));
        assert!(forest.is_leaf(root));
        assert_eq!(forest.leaf_count(), 1);
    }

    #[test]
    fn second_call_is_a_no_op_once_fully_coarsened() {
        let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 2, 0), 3);
        let (_, root) = forest.add_root();
        forest.split(root, &copy_extrapolate);
        for child in forest.children_of(forest.child_oct(root).unwrap()).to_vec() {
            forest.indicator_mut(child).set_to_coarsen();
        }
        let collective = LocalCollective;
        assert!(coarsen(&mut forest, 0, &collective, &first_child_interpolate));
        assert!(!coarsen(&mut forest, 0, &collective, &first_child_interpolate));
    }

    #[test]
    fn coarsen_respects_the_2_1_neighbor_constraint() {
        let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 2, 0), 3);
        let (_, root) = forest.add_root();
        forest.split(root, &copy_extrapolate);
        let children = forest.children_of(forest.child_oct(root).unwrap()).to_vec();
        forest.split(children[0], &copy_extrapolate);
        for grandchild in forest.children_of(forest.child_oct(children[0]).unwrap()).to_vec() {
            forest.indicator_mut(grandchild).set_to_coarsen();
        }
        for child in &children {
            forest.indicator_mut(*child).set_to_coarsen();
        }

        let collective = LocalCollective;
        coarsen(&mut forest, 0, &collective, &first_child_interpolate);
        // children[0] cannot collapse on the same pass that would also
        // collapse its parent oct: its own children must coarsen first.
        assert!(forest.is_leaf(children[0]));
    }
}
