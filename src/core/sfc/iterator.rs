//! The SFC traversal state machine (spec.md §4.4,
//! "AbstractTreeIterator"), grounded on `tamra/includes/core/TreeIterator.h`
//! and `includes/core/iterator/AbstractTreeIterator.h`.
//!
//! Unlike the original's `TreeIterator`, which stores a reference to the
//! forest it walks, [`ForestIterator`] stores only positional state
//! (`order_path`/`index_path`/per-level orientations) and takes the
//! [`Forest`] it walks as a parameter to every method. This sidesteps a
//! persistent-borrow-vs-mutation conflict `toCellId(..., create=true)`
//! would otherwise create (it must call [`Forest::split`] while the
//! iterator is mid-traversal) and is the idiomatic Rust shape for a
//! cursor over data it doesn't own.

use crate::core::cell::CellRef;
use crate::core::cell_id::{CellId, CellIdManager, OrderPath};
use crate::core::direction::DirectionTable;
use crate::core::forest::Forest;
use crate::core::indicator::Ownership;
use crate::core::sfc::SpaceFillingCurve;
use crate::payload::{CellPayload, ExtrapolateFn};

/// The iterator's position validity, per spec.md §4.4's "Initial/
/// terminal states". `AtStart`/`AtEnd` are the two one-past-the-end
/// positions reachable by exhausting `prev`/`next`; from either, only
/// the opposite-direction move is valid (spec.md states this
/// explicitly for `AtEnd`; `AtStart` is this crate's symmetric
/// extension of the same rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterState {
    Unpositioned,
    Positioned,
    AtStart,
    AtEnd,
}

/// A cursor over one forest's leaves in SFC order, generic over the
/// curve `C` (spec.md: "Two iterators with identical public behavior").
#[derive(Debug, Clone)]
pub struct ForestIterator<C: SpaceFillingCurve> {
    sfc: C,
    cell_id_manager: CellIdManager,
    state: IterState,
    /// `[root_index, order_1, .., order_L]`.
    order_path: OrderPath,
    /// Sibling numbers for levels `1..=L` (`index_path.len() ==
    /// order_path.len() - 1`).
    index_path: Vec<usize>,
    /// One orientation per path entry, `orientations[0]` is the root's.
    orientations: Vec<C::Orientation>,
    current_cell: Option<CellRef>,
}

impl<C: SpaceFillingCurve> ForestIterator<C> {
    pub fn new(sfc: C, max_level: u32, n_roots: usize, number_children: usize) -> Self {
        ForestIterator {
            sfc,
            cell_id_manager: CellIdManager::new(max_level, n_roots, number_children),
            state: IterState::Unpositioned,
            order_path: Vec::new(),
            index_path: Vec::new(),
            orientations: Vec::new(),
            current_cell: None,
        }
    }

    pub fn for_forest<P: CellPayload>(sfc: C, forest: &Forest<P>) -> Self {
        Self::new(sfc, forest.max_level(), forest.number_of_roots(), forest.direction_table().number_children())
    }

    fn require_positioned(&self) {
        assert!(
            matches!(self.state, IterState::Positioned | IterState::AtStart | IterState::AtEnd),
            "iterator operation used before toBegin/toEnd"
        );
    }

    pub fn current_cell(&self) -> CellRef {
        assert_eq!(self.state, IterState::Positioned, "current_cell() requires a positioned iterator");
        self.current_cell.expect("Positioned state always carries a current cell")
    }

    pub fn order_path(&self) -> &OrderPath {
        &self.order_path
    }

    pub fn cell_id_manager(&self) -> &CellIdManager {
        &self.cell_id_manager
    }

    pub fn cell_id_plain(&self) -> CellId {
        self.cell_id_manager.order_path_to_id_plain(&self.order_path)
    }

    pub fn cell_id_packed(&self) -> CellId {
        self.cell_id_manager.order_path_to_id_packed(&self.order_path)
    }

    fn order_path_of(&self, id: &CellId) -> OrderPath {
        match id {
            CellId::Plain(_) => self.cell_id_manager.id_to_order_path_plain(id),
            CellId::Packed(_) => self.cell_id_manager.id_to_order_path_packed(id),
        }
    }

    pub fn cell_id_gt(&self, id: &CellId) -> bool {
        self.cell_id_manager.cell_id_gt(&self.order_path, &self.order_path_of(id))
    }

    pub fn cell_id_gte(&self, id: &CellId) -> bool {
        self.cell_id_manager.cell_id_gte(&self.order_path, &self.order_path_of(id))
    }

    pub fn cell_id_lt(&self, id: &CellId) -> bool {
        self.cell_id_manager.cell_id_lt(&self.order_path, &self.order_path_of(id))
    }

    pub fn cell_id_lte(&self, id: &CellId) -> bool {
        self.cell_id_manager.cell_id_lte(&self.order_path, &self.order_path_of(id))
    }

    fn is_leaf_for_sweep<P: CellPayload>(forest: &Forest<P>, cell: CellRef, sweep_level: u32) -> bool {
        forest.is_leaf(cell) || forest.level(cell) >= sweep_level
    }

    fn position_at_root<P: CellPayload>(&mut self, forest: &Forest<P>, root_index: usize) {
        self.order_path = vec![root_index as u32];
        self.index_path = Vec::new();
        self.orientations = vec![self.sfc.root_orientation()];
        self.current_cell = Some(forest.roots()[root_index].cell);
    }

    /// Descends from the current cell to the first (`reverse = false`)
    /// or last (`reverse = true`) leaf-for-`sweep_level` in its
    /// subtree, extending `order_path`/`index_path`/`orientations`
    /// along the way.
    fn descend<P: CellPayload>(&mut self, forest: &Forest<P>, sweep_level: u32, reverse: bool) {
        loop {
            let current = self.current_cell.expect("descend requires a current cell");
            if Self::is_leaf_for_sweep(forest, current, sweep_level) {
                return;
            }
            let table = forest.direction_table();
            let orientation = *self.orientations.last().expect("orientations tracks one entry per path level");
            let order = if reverse { table.number_children() - 1 } else { 0 };
            let sibling = self.sfc.order_to_sibling(table, orientation, order);
            let oct = forest.child_oct(current).expect("non-leaf-for-sweep cell with level < sweep_level must have a child oct");
            let child = forest.children_of(oct)[sibling];
            self.order_path.push(order as u32);
            self.index_path.push(sibling);
            self.orientations.push(self.sfc.child_orientation(table, orientation, order));
            self.current_cell = Some(child);
        }
    }

    /// Descends to the first/last *owned* leaf in the current cell's
    /// subtree (spec.md §4.4, `toOwnedLeaf`); `false` if no descendant
    /// is owned, leaving the cursor on whatever leaf-for-sweep it found
    /// going down the "has a ThisProc descendant" branch at each level.
    fn descend_owned<P: CellPayload>(&mut self, forest: &Forest<P>, sweep_level: u32, reverse: bool) -> bool {
        loop {
            let current = self.current_cell.expect("descend_owned requires a current cell");
            if Self::is_leaf_for_sweep(forest, current, sweep_level) {
                return forest.indicator(current).ownership() == Ownership::ThisProc;
            }
            let table = forest.direction_table();
            let orientation = *self.orientations.last().expect("orientations tracks one entry per path level");
            let number_children = table.number_children();
            let oct = forest.child_oct(current).expect("non-leaf-for-sweep cell must have a child oct");
            let orders: Box<dyn Iterator<Item = usize>> =
                if reverse { Box::new((0..number_children).rev()) } else { Box::new(0..number_children) };
            let mut found = None;
            for order in orders {
                let sibling = self.sfc.order_to_sibling(table, orientation, order);
                let child = forest.children_of(oct)[sibling];
                if forest.has_this_proc_descendant(child) {
                    found = Some((order, sibling, child));
                    break;
                }
            }
            match found {
                None => return false,
                Some((order, sibling, child)) => {
                    self.order_path.push(order as u32);
                    self.index_path.push(sibling);
                    self.orientations.push(self.sfc.child_orientation(table, orientation, order));
                    self.current_cell = Some(child);
                }
            }
        }
    }

    /// Climbs one level: pops the deepest path entry and repositions
    /// `current_cell` at its structural parent. Panics at a root (the
    /// structural parent chain, not `order_path`, is authoritative here
    /// — `Forest` already tracks it via `parent_oct`/`oct_parent_cell`).
    fn climb_one_level<P: CellPayload>(&mut self, forest: &Forest<P>) -> CellRef {
        let current = self.current_cell.expect("climb_one_level requires a current cell");
        let oct = forest.parent_oct(current).expect("cannot climb past a root cell");
        self.order_path.pop();
        self.index_path.pop();
        self.orientations.pop();
        forest.oct_parent_cell(oct)
    }

    pub fn to_begin<P: CellPayload>(&mut self, forest: &Forest<P>, sweep_level: u32) {
        assert!(forest.number_of_roots() > 0, "an empty forest has no begin position");
        self.position_at_root(forest, 0);
        self.descend(forest, sweep_level, false);
        self.state = IterState::Positioned;
    }

    pub fn to_end<P: CellPayload>(&mut self, forest: &Forest<P>, sweep_level: u32) {
        assert!(forest.number_of_roots() > 0, "an empty forest has no end position");
        self.position_at_root(forest, forest.number_of_roots() - 1);
        self.descend(forest, sweep_level, true);
        self.state = IterState::Positioned;
    }

    /// Advances to the next leaf, restricted to cells no deeper than
    /// `sweep_level`; `false` once the forest is exhausted (spec.md
    /// §4.4).
    pub fn next<P: CellPayload>(&mut self, forest: &Forest<P>, sweep_level: u32) -> bool {
        self.require_positioned();
        assert_ne!(self.state, IterState::AtEnd, "next() called after toEnd/exhaustion; only prev() is valid there");
        loop {
            let current = self.current_cell.expect("Positioned/AtStart always carries a current cell");
            match forest.parent_oct(current) {
                None => {
                    let root_index = forest.root_index_of(current).expect("a cell with no parent_oct must be a root");
                    if root_index + 1 < forest.number_of_roots() {
                        self.position_at_root(forest, root_index + 1);
                        self.descend(forest, sweep_level, false);
                        self.state = IterState::Positioned;
                        return true;
                    }
                    self.state = IterState::AtEnd;
                    return false;
                }
                Some(_) => {
                    let last_order = *self.order_path.last().expect("non-root cell has at least one order digit") as usize;
                    let number_children = forest.direction_table().number_children();
                    if last_order + 1 < number_children {
                        let parent = self.climb_one_level(forest);
                        let parent_orientation = *self.orientations.last().expect("orientations kept in sync with order_path");
                        let new_order = last_order + 1;
                        let table = forest.direction_table();
                        let sibling = self.sfc.order_to_sibling(table, parent_orientation, new_order);
                        let oct = forest.child_oct(parent).expect("parent must still have its child oct");
                        let child = forest.children_of(oct)[sibling];
                        self.order_path.push(new_order as u32);
                        self.index_path.push(sibling);
                        self.orientations.push(self.sfc.child_orientation(table, parent_orientation, new_order));
                        self.current_cell = Some(child);
                        self.descend(forest, sweep_level, false);
                        self.state = IterState::Positioned;
                        return true;
                    }
                    self.current_cell = Some(self.climb_one_level(forest));
                }
            }
        }
    }

    /// Retreats to the previous leaf, mirroring [`ForestIterator::next`].
    pub fn prev<P: CellPayload>(&mut self, forest: &Forest<P>, sweep_level: u32) -> bool {
        self.require_positioned();
        assert_ne!(self.state, IterState::AtStart, "prev() called after toBegin-exhaustion; only next() is valid there");
        loop {
            let current = self.current_cell.expect("Positioned/AtEnd always carries a current cell");
            match forest.parent_oct(current) {
                None => {
                    let root_index = forest.root_index_of(current).expect("a cell with no parent_oct must be a root");
                    if root_index > 0 {
                        self.position_at_root(forest, root_index - 1);
                        self.descend(forest, sweep_level, true);
                        self.state = IterState::Positioned;
                        return true;
                    }
                    self.state = IterState::AtStart;
                    return false;
                }
                Some(_) => {
                    let last_order = *self.order_path.last().expect("non-root cell has at least one order digit") as usize;
                    if last_order > 0 {
                        let parent = self.climb_one_level(forest);
                        let parent_orientation = *self.orientations.last().expect("orientations kept in sync with order_path");
                        let new_order = last_order - 1;
                        let table = forest.direction_table();
                        let sibling = self.sfc.order_to_sibling(table, parent_orientation, new_order);
                        let oct = forest.child_oct(parent).expect("parent must still have its child oct");
                        let child = forest.children_of(oct)[sibling];
                        self.order_path.push(new_order as u32);
                        self.index_path.push(sibling);
                        self.orientations.push(self.sfc.child_orientation(table, parent_orientation, new_order));
                        self.current_cell = Some(child);
                        self.descend(forest, sweep_level, true);
                        self.state = IterState::Positioned;
                        return true;
                    }
                    self.current_cell = Some(self.climb_one_level(forest));
                }
            }
        }
    }

    /// `next`, skipping cells not owned by this process.
    pub fn owned_next<P: CellPayload>(&mut self, forest: &Forest<P>, sweep_level: u32) -> bool {
        loop {
            if !self.next(forest, sweep_level) {
                return false;
            }
            if forest.indicator(self.current_cell()).ownership() == Ownership::ThisProc {
                return true;
            }
        }
    }

    /// `prev`, skipping cells not owned by this process.
    pub fn owned_prev<P: CellPayload>(&mut self, forest: &Forest<P>, sweep_level: u32) -> bool {
        loop {
            if !self.prev(forest, sweep_level) {
                return false;
            }
            if forest.indicator(self.current_cell()).ownership() == Ownership::ThisProc {
                return true;
            }
        }
    }

    pub fn to_owned_begin<P: CellPayload>(&mut self, forest: &Forest<P>, sweep_level: u32) -> bool {
        self.to_begin(forest, sweep_level);
        if forest.indicator(self.current_cell()).ownership() == Ownership::ThisProc {
            return true;
        }
        self.owned_next(forest, sweep_level)
    }

    pub fn to_owned_end<P: CellPayload>(&mut self, forest: &Forest<P>, sweep_level: u32) -> bool {
        self.to_end(forest, sweep_level);
        if forest.indicator(self.current_cell()).ownership() == Ownership::ThisProc {
            return true;
        }
        self.owned_prev(forest, sweep_level)
    }

    pub fn to_leaf<P: CellPayload>(&mut self, forest: &Forest<P>, sweep_level: u32, reverse: bool) {
        self.require_positioned();
        self.descend(forest, sweep_level, reverse);
    }

    /// `true` iff the current subtree has an owned leaf to land on.
    pub fn to_owned_leaf<P: CellPayload>(&mut self, forest: &Forest<P>, sweep_level: u32, reverse: bool) -> bool {
        self.require_positioned();
        self.descend_owned(forest, sweep_level, reverse)
    }

    /// Repositions to `id`, materializing any missing intermediate
    /// cells via repeated [`Forest::split`]/[`Forest::split_root`] when
    /// `create` is set (spec.md §4.4: "the only path through which an
    /// iterator mutates the topology"). Panics if `create` is unset and
    /// the path is not already fully materialized.
    pub fn to_cell_id<P: CellPayload>(&mut self, forest: &mut Forest<P>, id: &CellId, create: bool, extrapolate: &ExtrapolateFn<P>) {
        let target = self.order_path_of(id);
        assert!(!target.is_empty(), "a cell id always names at least a root");
        let root_index = target[0] as usize;
        assert!(root_index < forest.number_of_roots(), "cell id names a root index out of range");

        let mut cell = forest.roots()[root_index].cell;
        let mut orientation = self.sfc.root_orientation();
        let mut index_path = Vec::with_capacity(target.len() - 1);
        let mut orientations = Vec::with_capacity(target.len());
        orientations.push(orientation);

        for &order in &target[1..] {
            if forest.is_leaf(cell) {
                assert!(create, "toCellId requires every intermediate cell to already exist unless create=true");
                if forest.is_root(cell) {
                    forest.split_root(cell, extrapolate);
                } else {
                    forest.split(cell, extrapolate);
                }
            }
            let table = forest.direction_table();
            let sibling = self.sfc.order_to_sibling(table, orientation, order as usize);
            orientation = self.sfc.child_orientation(table, orientation, order as usize);
            let oct = forest.child_oct(cell).expect("cell must have a child oct once materialized");
            cell = forest.children_of(oct)[sibling];
            index_path.push(sibling);
            orientations.push(orientation);
        }

        self.order_path = target;
        self.index_path = index_path;
        self.orientations = orientations;
        self.current_cell = Some(cell);
        self.state = IterState::Positioned;
    }
}

/// Computes the order-path of an arbitrary [`CellRef`] by climbing its
/// structural parent chain to a root, then replaying the curve
/// top-down to recover per-level orientations (Hilbert's orientation is
/// path-dependent, so it cannot be read off bottom-up). Used by the
/// managers (spec.md §4.8, §4.9) to turn an owned/ghost cell into the
/// `CellId` it sends over the wire.
pub fn order_path_for_cell<C: SpaceFillingCurve, P: CellPayload>(sfc: &C, forest: &Forest<P>, cell: CellRef) -> OrderPath {
    let mut siblings_bottom_up = Vec::new();
    let mut current = cell;
    while let Some(oct) = forest.parent_oct(current) {
        siblings_bottom_up.push(forest.sibling_of(current).expect("a non-root cell always has a sibling number"));
        current = forest.oct_parent_cell(oct);
    }
    let root_index = forest.root_index_of(current).expect("climbing parent_oct to the top must reach a root cell");

    let mut order_path = vec![root_index as u32];
    let mut orientation = sfc.root_orientation();
    let table: &DirectionTable = forest.direction_table();
    for &sibling in siblings_bottom_up.iter().rev() {
        let order = sfc.sibling_to_order(table, orientation, sibling);
        order_path.push(order as u32);
        orientation = sfc.child_orientation(table, orientation, order);
    }
    order_path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forest::Dims;
    use crate::core::sfc::morton::Morton;
    use crate::payload::{copy_extrapolate, Scalar};

    fn uniform_forest(min_level: u32, max_level: u32) -> Forest<Scalar> {
        let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 2, 0), max_level);
        let (_, root) = forest.add_root();
        let mut to_split = vec![root];
        for _ in 0..min_level {
            let mut next = Vec::new();
            for cell in to_split {
                forest.split(cell, &copy_extrapolate);
                let oct = forest.child_oct(cell).unwrap();
                next.extend(forest.children_of(oct).iter().copied());
            }
            to_split = next;
        }
        forest
    }

    #[test]
    fn to_begin_to_end_covers_every_leaf_exactly_once() {
        let forest = uniform_forest(2, 3);
        let mut it = ForestIterator::for_forest(Morton::xyz(2), &forest);
        let mut seen = std::collections::HashSet::new();
        it.to_begin(&forest, forest.max_level());
        loop {
            assert!(seen.insert(it.current_cell()), "next() revisited a leaf");
            if !it.next(&forest, forest.max_level()) {
                break;
            }
        }
        assert_eq!(seen.len(), forest.leaf_count());
    }

    #[test]
    fn forward_and_backward_traversal_agree() {
        let forest = uniform_forest(2, 2);
        let mut forward = ForestIterator::for_forest(Morton::xyz(2), &forest);
        forward.to_begin(&forest, forest.max_level());
        let mut forward_cells = vec![forward.current_cell()];
        while forward.next(&forest, forest.max_level()) {
            forward_cells.push(forward.current_cell());
        }

        let mut backward = ForestIterator::for_forest(Morton::xyz(2), &forest);
        backward.to_end(&forest, forest.max_level());
        let mut backward_cells = vec![backward.current_cell()];
        while backward.prev(&forest, forest.max_level()) {
            backward_cells.push(backward.current_cell());
        }
        backward_cells.reverse();

        assert_eq!(forward_cells, backward_cells);
    }

    #[test]
    #[should_panic(expected = "before toBegin")]
    fn next_before_to_begin_panics() {
        let forest = uniform_forest(1, 2);
        let mut it = ForestIterator::for_forest(Morton::xyz(2), &forest);
        it.next(&forest, forest.max_level());
    }

    #[test]
    fn to_cell_id_with_create_materializes_missing_cells() {
        let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 2, 0), 3);
        let (_, root) = forest.add_root();
        let mut it = ForestIterator::for_forest(Morton::xyz(2), &forest);
        let target = it.cell_id_manager().order_path_to_id_plain(&vec![0, 2, 1]);
        it.to_cell_id(&mut forest, &target, true, &copy_extrapolate);
        assert!(forest.is_leaf(it.current_cell()));
        assert_eq!(forest.level(it.current_cell()), 2);
        let _ = root;
    }

    #[test]
    fn order_path_for_cell_round_trips_through_an_iterator_position() {
        let forest = uniform_forest(2, 2);
        let sfc = Morton::xyz(2);
        let mut it = ForestIterator::for_forest(sfc.clone(), &forest);
        it.to_begin(&forest, forest.max_level());
        loop {
            let recovered = order_path_for_cell(&sfc, &forest, it.current_cell());
            assert_eq!(&recovered, it.order_path());
            if !it.next(&forest, forest.max_level()) {
                break;
            }
        }
    }
}
