//! Cell topology operations: split, coarsen, and neighbor-finding
//! (spec.md §4.2), grounded on `tamra/includes/core/Cell.h`.
//!
//! Cells live in [`crate::core::forest::Forest`]'s arena; `CellRef` is a
//! plain index into it (spec.md §9, "arena of cells... weak
//! back-references are plain indices").

use crate::core::direction::Extreme;
use crate::core::forest::{CellSlot, Forest, OctSlot};
use crate::core::indicator::{Action, Ownership};
use crate::core::oct::OctRef;
use crate::payload::{CellPayload, ExtrapolateFn, InterpolateFn};

/// An index into a [`Forest`]'s cell arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef(pub(crate) u32);

impl CellRef {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl<P: CellPayload> Forest<P> {
    /// Splits a leaf cell into `2^d` children at `level + 1`, cascading
    /// 2:1-violating neighbor splits first (spec.md §4.2).
    ///
    /// Panics if `cell` is already split or at `max_level`.
    pub fn split(&mut self, cell: CellRef, extrapolate: &ExtrapolateFn<P>) {
        assert!(self.is_leaf(cell), "split requires a leaf cell");
        assert!(self.level(cell) < self.max_level(), "cannot split past max_level");

        let n_faces = self.direction_table().number_of_face_directions();
        for dir in 0..n_faces {
            if let Some(neighbor) = self.get_neighbor_cell(cell, dir) {
                if self.is_leaf(neighbor) && self.level(neighbor) < self.level(cell) {
                    self.split(neighbor, extrapolate);
                }
            }
        }

        self.materialize_oct(cell, extrapolate);
    }

    /// Like [`Forest::split`], but for a root cell whose neighbor
    /// wiring comes from its `RootEntry` rather than a parent oct.
    /// Root cells have no 2:1 cascade to perform against other roots
    /// (spec.md treats the root set as fixed and externally wired), so
    /// this only materializes the child oct.
    pub fn split_root(&mut self, cell: CellRef, extrapolate: &ExtrapolateFn<P>) {
        assert!(self.is_root(cell), "split_root requires a root cell");
        assert!(self.is_leaf(cell), "split_root requires a leaf cell");
        assert!(self.level(cell) < self.max_level(), "cannot split past max_level");
        self.materialize_oct(cell, extrapolate);
    }

    fn materialize_oct(&mut self, cell: CellRef, extrapolate: &ExtrapolateFn<P>) {
        let n_faces = self.direction_table().number_of_face_directions();
        let oct_neighbors: Vec<Option<CellRef>> = (0..n_faces).map(|dir| self.get_neighbor_cell(cell, dir)).collect();
        let number_children = self.direction_table().number_children();
        let child_level = self.level(cell) + 1;
        let parent_payload = self.payload(cell).cloned().unwrap_or_default();

        let oct_ref = OctRef(self.octs.len() as u32);
        let first_child_index = self.cells.len() as u32;
        let children: Vec<CellRef> = (0..number_children).map(|i| CellRef(first_child_index + i as u32)).collect();

        self.octs.push(OctSlot { parent_cell: cell, level: child_level, neighbors: oct_neighbors, children: children.clone() });

        for (sibling, &child_ref) in children.iter().enumerate() {
            self.cells.push(CellSlot {
                parent_oct: Some(oct_ref),
                sibling: Some(sibling),
                child_oct: None,
                indicator: self.indicator(cell),
                payload: Some(extrapolate(&parent_payload)),
                level: child_level,
                root_index: None,
            });
            debug_assert_eq!(CellRef(self.cells.len() as u32 - 1), child_ref);
        }

        self.cells[cell.index()].child_oct = Some(oct_ref);
    }

    /// Collapses `cell`'s child oct into a leaf, iff every child is a
    /// leaf marked `Coarsen` and every neighbor leaf stays within 2:1
    /// after the collapse (spec.md §4.2). Returns whether it happened;
    /// every other case is a silent no-op, never a failure.
    pub fn coarsen(&mut self, cell: CellRef, min_level: u32, interpolate: &InterpolateFn<P>) -> bool {
        if self.is_leaf(cell) || self.level(cell) < min_level {
            return false;
        }
        let oct = self.child_oct(cell).expect("non-leaf cell must have a child oct");
        let children: Vec<CellRef> = self.children_of(oct).to_vec();

        let all_leaves_marked_coarsen =
            children.iter().all(|&c| self.is_leaf(c) && self.indicator(c).action() == Action::Coarsen);
        if !all_leaves_marked_coarsen {
            return false;
        }

        if !self.coarsen_keeps_balance(cell, &children) {
            return false;
        }

        let child_payloads: Vec<P> = children.iter().map(|&c| self.payload(c).cloned().unwrap_or_default()).collect();
        let interpolated = interpolate(&child_payloads);

        self.cells[cell.index()].child_oct = None;
        self.cells[cell.index()].payload = Some(interpolated);
        self.cells[cell.index()].indicator.set_to_unchange();
        true
    }

    fn coarsen_keeps_balance(&self, cell: CellRef, children: &[CellRef]) -> bool {
        let this_level = self.level(cell);
        let n_faces = self.direction_table().number_of_face_directions();
        for dir in 0..n_faces {
            let sibling_numbers = self.direction_table().dir_sibling_numbers(dir);
            for &sibling in sibling_numbers {
                let Some(&child) = children.iter().find(|&&c| self.sibling_of(c) == Some(sibling)) else {
                    continue;
                };
                if let Some(neighbor) = self.get_neighbor_cell(child, dir) {
                    if self.is_leaf(neighbor) {
                        let would_be_diff = (self.level(neighbor) as i64 - this_level as i64).unsigned_abs();
                        let neighbor_coarsen_too = self.indicator(neighbor).action() == Action::Coarsen
                            && self.level(neighbor) == self.level(child);
                        if would_be_diff > 1 && !(self.level(neighbor) <= this_level || neighbor_coarsen_too) {
                            return false;
                        }
                    } else {
                        // Neighbor has children; collapsing would put them
                        // two levels away from `cell`, breaking 2:1.
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Returns the neighbor cell in direction `dir`, handling faces,
    /// edges and corners uniformly (spec.md §4.2).
    pub fn get_neighbor_cell(&self, cell: CellRef, dir: usize) -> Option<CellRef> {
        if self.direction_table().is_face_direction(dir) {
            self.get_neighbor_cell_face(cell, dir)
        } else {
            self.get_neighbor_cell_decomposed(cell, dir)
        }
    }

    fn get_neighbor_cell_face(&self, cell: CellRef, dir: usize) -> Option<CellRef> {
        let slot = &self.cells[cell.index()];
        match slot.parent_oct {
            None => {
                let root_index = slot.root_index.expect("a cell with no parent oct must be a root");
                self.roots()[root_index].neighbors[dir]
            }
            Some(parent_oct) => {
                let sibling = slot.sibling.expect("non-root cell must have a sibling index");
                let (same_parent, neighbor_sibling) = self.direction_table().direct_neighbor_cell_info(sibling, dir);
                if same_parent {
                    Some(self.octs[parent_oct.index()].children[neighbor_sibling])
                } else {
                    match self.octs[parent_oct.index()].neighbors[dir] {
                        None => None,
                        Some(nc) => match self.child_oct(nc) {
                            None => Some(nc),
                            Some(nc_oct) => Some(self.octs[nc_oct.index()].children[neighbor_sibling]),
                        },
                    }
                }
            }
        }
    }

    fn get_neighbor_cell_decomposed(&self, cell: CellRef, dir: usize) -> Option<CellRef> {
        let face_dirs: Vec<usize> = if self.touch_len(dir) == 2 {
            let (a, b) = self.direction_table().plane_to_direct_dirs(dir);
            vec![a, b]
        } else {
            let (a, b, c) = self.direction_table().volume_to_direct_dirs(dir);
            vec![a, b, c]
        };

        let mut current = cell;
        for face_dir in face_dirs {
            current = self.get_neighbor_cell_face(current, face_dir)?;
        }
        Some(current)
    }

    /// How many axes direction `dir` touches: 1 for a face, 2 for an
    /// edge, 3 for a corner (3-D only). Corners are always the last
    /// 8 directions in the table when present.
    fn touch_len(&self, dir: usize) -> usize {
        if self.direction_table().is_face_direction(dir) {
            1
        } else {
            let n_dirs = self.direction_table().number_of_directions();
            let n_corners = if self.dims().number_dimensions() == 3 { 8 } else { 0 };
            if dir < n_dirs - n_corners {
                2
            } else {
                3
            }
        }
    }

    /// Invokes `f(this, neighbor_or_none, dir)` for every leaf adjacent
    /// to `cell` from each of `directions`, handling the 0/1/`2^(d-1)`
    /// leaves-per-direction fan-out that a coarser `cell` facing a
    /// finer neighbor subtree produces.
    pub fn apply_to_neighbor_leaf_cells(&self, cell: CellRef, directions: &[usize], mut f: impl FnMut(CellRef, Option<CellRef>, usize)) {
        for &dir in directions {
            match self.get_neighbor_cell(cell, dir) {
                None => f(cell, None, dir),
                Some(neighbor) => {
                    if self.is_leaf(neighbor) {
                        f(cell, Some(neighbor), dir);
                    } else {
                        self.for_each_finer_neighbor_leaf(cell, neighbor, dir, &mut f);
                    }
                }
            }
        }
    }

    fn for_each_finer_neighbor_leaf(&self, cell: CellRef, neighbor_oct_owner: CellRef, dir: usize, f: &mut impl FnMut(CellRef, Option<CellRef>, usize)) {
        let opposite_siblings = self.direction_table().dir_sibling_numbers(self.opposite_face_dir(dir));
        let oct = self.child_oct(neighbor_oct_owner).expect("neighbor must have a child oct to recurse into");
        for &sibling in opposite_siblings {
            let child = self.octs[oct.index()].children[sibling];
            if self.is_leaf(child) {
                f(cell, Some(child), dir);
            } else {
                self.for_each_finer_neighbor_leaf(cell, child, dir, f);
            }
        }
    }

    fn opposite_face_dir(&self, dir: usize) -> usize {
        if self.direction_table().is_face_direction(dir) {
            dir ^ 1
        } else {
            dir
        }
    }

    /// Propagates `ThisProc` ownership down the whole subtree rooted at
    /// `cell` (spec.md §4.3, "recursive variant").
    pub fn set_to_this_proc_recurs(&mut self, cell: CellRef) {
        self.indicator_mut(cell).set_to_this_proc();
        if let Some(oct) = self.child_oct(cell) {
            for child in self.octs[oct.index()].children.clone() {
                self.set_to_this_proc_recurs(child);
            }
        }
    }

    pub fn set_to_other_proc_recurs(&mut self, cell: CellRef) {
        self.indicator_mut(cell).set_to_other_proc();
        if let Some(oct) = self.child_oct(cell) {
            for child in self.octs[oct.index()].children.clone() {
                self.set_to_other_proc_recurs(child);
            }
        }
    }

    /// `true` iff `cell` or any descendant carries `Ownership::ThisProc`
    /// (used by the back-propagation pass every partitioned manager
    /// runs — spec.md §4.5, §4.8).
    pub fn has_this_proc_descendant(&self, cell: CellRef) -> bool {
        if self.indicator(cell).ownership() == Ownership::ThisProc {
            return true;
        }
        match self.child_oct(cell) {
            None => false,
            Some(oct) => self.octs[oct.index()].children.iter().any(|&c| self.has_this_proc_descendant(c)),
        }
    }

    /// Sets `cell`'s ownership to `ThisProc` iff it has a `ThisProc`
    /// descendant, else `OtherProc` — without touching its action bit.
    /// Applied bottom-up by the managers after a topology-changing pass.
    pub fn back_propagate_ownership(&mut self, cell: CellRef) {
        if let Some(oct) = self.child_oct(cell) {
            for child in self.octs[oct.index()].children.clone() {
                self.back_propagate_ownership(child);
            }
        }
        if self.has_this_proc_descendant(cell) {
            self.indicator_mut(cell).set_to_this_proc();
        } else {
            self.indicator_mut(cell).set_to_other_proc();
        }
    }
}
