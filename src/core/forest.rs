//! The forest: roots, their face-adjacency wiring, and the cell/oct
//! arenas that back every other module (spec.md §3's Lifecycle section;
//! §9 Design Notes on arena ownership).
//!
//! Grounded on `tamra/includes/core/Tree.h` and `includes/core/RootCellEntry.h`
//! for the root/neighbor-table shape, and on CLAM's `Tree` (owns the
//! structure, exposes builder-style construction) for the overall feel.

use crate::constants::MAX_LEVEL_BOUND;
use crate::core::cell::CellRef;
use crate::core::direction::DirectionTable;
use crate::core::indicator::Indicator;
use crate::core::oct::OctRef;
use crate::payload::CellPayload;

/// Per-axis child counts. A `0` means that axis does not exist for this
/// forest (so `Dims::new(2, 2, 0)` is a 2-D forest with 2x2 children per
/// oct); at least one axis must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dims {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl Dims {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        assert!(nx > 0 || ny > 0 || nz > 0, "a forest needs at least one present axis");
        Dims { nx, ny, nz }
    }

    /// Sizes of the present (non-zero) axes, in x/y/z order.
    pub fn axis_sizes(&self) -> Vec<usize> {
        [self.nx, self.ny, self.nz].into_iter().filter(|&n| n > 0).collect()
    }

    pub fn number_dimensions(&self) -> usize {
        self.axis_sizes().len()
    }
}

pub(crate) struct CellSlot<P> {
    pub(crate) parent_oct: Option<OctRef>,
    /// This cell's position among its oct's children, `None` for roots.
    pub(crate) sibling: Option<usize>,
    pub(crate) child_oct: Option<OctRef>,
    pub(crate) indicator: Indicator,
    pub(crate) payload: Option<P>,
    pub(crate) level: u32,
    /// `Some(i)` iff this cell is the root cell of `roots[i]`.
    pub(crate) root_index: Option<usize>,
}

pub(crate) struct OctSlot {
    pub(crate) parent_cell: CellRef,
    pub(crate) level: u32,
    /// One direct-neighbor cell per face direction, at the oct's parent
    /// level or coarser (see `core::cell::Forest::get_neighbor_cell`).
    pub(crate) neighbors: Vec<Option<CellRef>>,
    /// Children in canonical sibling-index order.
    pub(crate) children: Vec<CellRef>,
}

/// A root cell plus its face-adjacency wiring, as supplied by the
/// application (spec.md §6, "Forest construction surface").
#[derive(Debug, Clone)]
pub struct RootEntry {
    pub cell: CellRef,
    /// One entry per face direction (`2 * number_dimensions`); `None` is
    /// a domain boundary.
    pub neighbors: Vec<Option<CellRef>>,
}

/// Owns every cell and oct ever created for one mesh, plus the roots and
/// the per-forest direction tables.
pub struct Forest<P: CellPayload> {
    dims: Dims,
    max_level: u32,
    direction_table: DirectionTable,
    pub(crate) cells: Vec<CellSlot<P>>,
    pub(crate) octs: Vec<OctSlot>,
    roots: Vec<RootEntry>,
}

impl<P: CellPayload> Forest<P> {
    pub fn new(dims: Dims, max_level: u32) -> Self {
        assert!(max_level >= 1, "max_level must allow at least one split");
        assert!(max_level <= MAX_LEVEL_BOUND, "max_level {max_level} exceeds MAX_LEVEL_BOUND ({MAX_LEVEL_BOUND})");
        Forest { direction_table: DirectionTable::new(dims), dims, max_level, cells: Vec::new(), octs: Vec::new(), roots: Vec::new() }
    }

    /// Adds one root cell with a default payload and no neighbor wiring;
    /// wire its neighbors afterwards with
    /// [`Forest::set_root_neighbor`]. Returns the new root's index and
    /// cell reference.
    pub fn add_root(&mut self) -> (usize, CellRef) {
        let root_index = self.roots.len();
        let cell_ref = CellRef(self.cells.len() as u32);
        self.cells.push(CellSlot {
            parent_oct: None,
            sibling: None,
            child_oct: None,
            indicator: Indicator::default(),
            payload: Some(P::default()),
            level: 0,
            root_index: Some(root_index),
        });
        let n_faces = self.direction_table.number_of_face_directions();
        self.roots.push(RootEntry { cell: cell_ref, neighbors: vec![None; n_faces] });
        (root_index, cell_ref)
    }

    /// Wires `root_index`'s face-neighbor in direction `dir` to
    /// `neighbor`. Root wiring is symmetric only if the caller wires
    /// both sides; the forest does not infer the opposite direction.
    pub fn set_root_neighbor(&mut self, root_index: usize, dir: usize, neighbor: Option<CellRef>) {
        assert!(dir < self.direction_table.number_of_face_directions(), "direction {dir} is not a face direction");
        self.roots[root_index].neighbors[dir] = neighbor;
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    pub fn direction_table(&self) -> &DirectionTable {
        &self.direction_table
    }

    pub fn roots(&self) -> &[RootEntry] {
        &self.roots
    }

    pub fn number_of_roots(&self) -> usize {
        self.roots.len()
    }

    pub fn level(&self, cell: CellRef) -> u32 {
        self.cells[cell.index()].level
    }

    pub fn is_leaf(&self, cell: CellRef) -> bool {
        self.cells[cell.index()].child_oct.is_none()
    }

    pub fn is_root(&self, cell: CellRef) -> bool {
        self.cells[cell.index()].root_index.is_some()
    }

    pub fn root_index_of(&self, cell: CellRef) -> Option<usize> {
        self.cells[cell.index()].root_index
    }

    pub fn indicator(&self, cell: CellRef) -> Indicator {
        self.cells[cell.index()].indicator
    }

    pub fn indicator_mut(&mut self, cell: CellRef) -> &mut Indicator {
        &mut self.cells[cell.index()].indicator
    }

    pub fn payload(&self, cell: CellRef) -> Option<&P> {
        self.cells[cell.index()].payload.as_ref()
    }

    pub fn set_payload(&mut self, cell: CellRef, payload: P) {
        self.cells[cell.index()].payload = Some(payload);
    }

    pub fn parent_oct(&self, cell: CellRef) -> Option<OctRef> {
        self.cells[cell.index()].parent_oct
    }

    pub fn child_oct(&self, cell: CellRef) -> Option<OctRef> {
        self.cells[cell.index()].child_oct
    }

    pub fn sibling_of(&self, cell: CellRef) -> Option<usize> {
        self.cells[cell.index()].sibling
    }

    pub fn children_of(&self, oct: OctRef) -> &[CellRef] {
        &self.octs[oct.index()].children
    }

    pub fn oct_level(&self, oct: OctRef) -> u32 {
        self.octs[oct.index()].level
    }

    pub fn oct_parent_cell(&self, oct: OctRef) -> CellRef {
        self.octs[oct.index()].parent_cell
    }

    /// Every leaf currently in the forest, in arena order (not SFC
    /// order — use [`crate::core::sfc::iterator::ForestIterator`] for
    /// that).
    pub fn all_leaves(&self) -> impl Iterator<Item = CellRef> + '_ {
        (0..self.cells.len()).map(|i| CellRef(i as u32)).filter(move |&c| self.is_leaf(c))
    }

    pub fn leaf_count(&self) -> usize {
        self.all_leaves().count()
    }

    /// Every cell currently in the forest (leaves and interior), in
    /// arena order.
    pub fn all_cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (0..self.cells.len()).map(|i| CellRef(i as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Scalar;

    #[test]
    fn add_root_creates_a_leaf_at_level_zero() {
        let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 2, 0), 4);
        let (idx, root) = forest.add_root();
        assert_eq!(idx, 0);
        assert_eq!(forest.level(root), 0);
        assert!(forest.is_leaf(root));
        assert!(forest.is_root(root));
    }

    #[test]
    fn root_neighbor_wiring_round_trips() {
        let mut forest: Forest<Scalar> = Forest::new(Dims::new(2, 0, 0), 4);
        let (_, a) = forest.add_root();
        let (_, b) = forest.add_root();
        forest.set_root_neighbor(0, 0, Some(b));
        forest.set_root_neighbor(1, 1, Some(a));
        assert_eq!(forest.roots()[0].neighbors[0], Some(b));
        assert_eq!(forest.roots()[1].neighbors[1], Some(a));
    }
}
