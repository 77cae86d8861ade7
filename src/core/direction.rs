//! Sibling/coordinate bijections and face/edge/corner direction algebra
//! (spec.md §4.1), grounded on
//! `includes/core/ChildAndDirectionTables.h`.
//!
//! A direction touches a non-empty subset of the oct's present axes: one
//! axis for a face, two for an edge (only possible once the oct has at
//! least two axes), three for a corner (only possible in 3-D). Directions
//! are enumerated face-first, axis by axis, then edges by axis-pair, then
//! the single 3-D corner group — this matches the layout spec.md gives
//! (2, 8, 26 total directions in 1/2/3-D) without hardcoding three
//! separate tables.

use super::forest::Dims;

/// Which end of an axis a direction touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extreme {
    Positive,
    Negative,
}

/// Precomputed direction/sibling tables for one forest's child layout.
/// Built once from the forest's [`Dims`] and reused for the forest's
/// whole lifetime (spec.md describes these as "compile-time-fixed"; this
/// crate fixes them at construction instead, since a `Dims` derived
/// const-generic array would need unstable `generic_const_exprs` — see
/// DESIGN.md).
#[derive(Debug, Clone)]
pub struct DirectionTable {
    /// Sizes of the present axes, in x/y/z order. `axes.len()` is the
    /// dimensionality `d`.
    axes: Vec<usize>,
    /// Per direction, the axes (indices into `axes`) and extremes it
    /// touches, in the canonical enumeration order.
    touches: Vec<Vec<(usize, Extreme)>>,
    /// `dir_sibling_numbers[d]`, memoized.
    siblings: Vec<Vec<usize>>,
}

impl DirectionTable {
    pub fn new(dims: Dims) -> Self {
        let axes = dims.axis_sizes();
        let d = axes.len();
        assert!((1..=3).contains(&d), "forest_mesh supports 1, 2 or 3 present axes, got {d}");

        let mut touches = Vec::new();

        // Faces: one axis each, ordered axis-major, positive extreme first.
        for axis in 0..d {
            touches.push(vec![(axis, Extreme::Positive)]);
            touches.push(vec![(axis, Extreme::Negative)]);
        }

        // Edges: axis pairs, lexicographic, 4 sign combinations each.
        if d >= 2 {
            for a in 0..d {
                for b in (a + 1)..d {
                    for sb in [Extreme::Positive, Extreme::Negative] {
                        for sa in [Extreme::Positive, Extreme::Negative] {
                            touches.push(vec![(a, sa), (b, sb)]);
                        }
                    }
                }
            }
        }

        // Corners: only the single axis triple in 3-D, 8 sign combinations.
        if d == 3 {
            for sz in [Extreme::Positive, Extreme::Negative] {
                for sy in [Extreme::Positive, Extreme::Negative] {
                    for sx in [Extreme::Positive, Extreme::Negative] {
                        touches.push(vec![(0, sx), (1, sy), (2, sz)]);
                    }
                }
            }
        }

        let siblings = touches.iter().map(|t| Self::compute_dir_sibling_numbers(&axes, t)).collect();

        DirectionTable { axes, touches, siblings }
    }

    fn boundary(axes: &[usize], axis: usize, extreme: Extreme) -> usize {
        match extreme {
            Extreme::Positive => axes[axis] - 1,
            Extreme::Negative => 0,
        }
    }

    fn coords_to_sibling_raw(axes: &[usize], coords: &[usize]) -> usize {
        let mut stride = 1;
        let mut sibling = 0;
        for (axis, &c) in coords.iter().enumerate() {
            sibling += c * stride;
            stride *= axes[axis];
        }
        sibling
    }

    fn compute_dir_sibling_numbers(axes: &[usize], touch: &[(usize, Extreme)]) -> Vec<usize> {
        let d = axes.len();
        let fixed: std::collections::HashMap<usize, usize> =
            touch.iter().map(|&(axis, extreme)| (axis, Self::boundary(axes, axis, extreme))).collect();
        let free_axes: Vec<usize> = (0..d).filter(|a| !fixed.contains_key(a)).collect();

        let mut result = Vec::new();
        let mut counters = vec![0usize; free_axes.len()];
        loop {
            let mut coords = vec![0usize; d];
            for (&axis, &val) in fixed.iter() {
                coords[axis] = val;
            }
            for (i, &axis) in free_axes.iter().enumerate() {
                coords[axis] = counters[i];
            }
            result.push(Self::coords_to_sibling_raw(axes, &coords));

            if free_axes.is_empty() {
                break;
            }
            let mut i = 0;
            loop {
                counters[i] += 1;
                if counters[i] < axes[free_axes[i]] {
                    break;
                }
                counters[i] = 0;
                i += 1;
                if i == free_axes.len() {
                    return result;
                }
            }
        }
        result
    }

    pub fn number_of_directions(&self) -> usize {
        self.touches.len()
    }

    pub fn number_children(&self) -> usize {
        self.axes.iter().product()
    }

    pub fn sibling_number_to_coords(&self, sibling: usize) -> Vec<usize> {
        let mut remaining = sibling;
        let mut coords = vec![0usize; self.axes.len()];
        for (axis, &size) in self.axes.iter().enumerate() {
            coords[axis] = remaining % size;
            remaining /= size;
        }
        coords
    }

    pub fn coords_to_sibling_number(&self, coords: &[usize]) -> usize {
        assert_eq!(coords.len(), self.axes.len(), "coordinate arity must match the forest's dimensionality");
        Self::coords_to_sibling_raw(&self.axes, coords)
    }

    fn face_dir_index(axis: usize, extreme: Extreme) -> usize {
        2 * axis + if extreme == Extreme::Positive { 0 } else { 1 }
    }

    /// Given a child's sibling number and a *face* direction, returns
    /// `(same_parent, neighbor_sibling)`: whether the neighbor in that
    /// direction lives in the same oct, and its sibling number (in the
    /// neighboring oct across the face, if not).
    pub fn direct_neighbor_cell_info(&self, sibling: usize, dir: usize) -> (bool, usize) {
        let touch = &self.touches[dir];
        assert_eq!(touch.len(), 1, "direct_neighbor_cell_info requires a face direction, got direction {dir}");
        let (axis, extreme) = touch[0];
        let mut coords = self.sibling_number_to_coords(sibling);
        let boundary = Self::boundary(&self.axes, axis, extreme);

        if coords[axis] == boundary {
            coords[axis] = Self::boundary(&self.axes, axis, Self::flip(extreme));
            (false, Self::coords_to_sibling_raw(&self.axes, &coords))
        } else {
            coords[axis] = match extreme {
                Extreme::Positive => coords[axis] + 1,
                Extreme::Negative => coords[axis] - 1,
            };
            (true, Self::coords_to_sibling_raw(&self.axes, &coords))
        }
    }

    fn flip(extreme: Extreme) -> Extreme {
        match extreme {
            Extreme::Positive => Extreme::Negative,
            Extreme::Negative => Extreme::Positive,
        }
    }

    /// Decomposes an edge direction into its two face-direction
    /// components.
    pub fn plane_to_direct_dirs(&self, dir: usize) -> (usize, usize) {
        let touch = &self.touches[dir];
        assert_eq!(touch.len(), 2, "plane_to_direct_dirs requires an edge direction, got direction {dir}");
        (Self::face_dir_index(touch[0].0, touch[0].1), Self::face_dir_index(touch[1].0, touch[1].1))
    }

    /// Decomposes a corner direction (3-D only) into its three
    /// face-direction components.
    pub fn volume_to_direct_dirs(&self, dir: usize) -> (usize, usize, usize) {
        let touch = &self.touches[dir];
        assert_eq!(touch.len(), 3, "volume_to_direct_dirs requires a corner direction, got direction {dir}");
        (
            Self::face_dir_index(touch[0].0, touch[0].1),
            Self::face_dir_index(touch[1].0, touch[1].1),
            Self::face_dir_index(touch[2].0, touch[2].1),
        )
    }

    /// The sibling numbers of every child adjacent to direction `dir`.
    pub fn dir_sibling_numbers(&self, dir: usize) -> &[usize] {
        &self.siblings[dir]
    }

    /// `true` for a face direction (the only kind `getNeighborCell`'s
    /// single-axis walk handles directly).
    pub fn is_face_direction(&self, dir: usize) -> bool {
        self.touches[dir].len() == 1
    }

    pub fn number_of_face_directions(&self) -> usize {
        2 * self.axes.len()
    }

    /// Sizes of the present axes, in x/y/z order — the same shape as
    /// [`Dims::axis_sizes`], exposed here so
    /// [`crate::core::sfc`] curves can build mixed-radix permutations
    /// without threading a second copy of `Dims` around.
    pub fn axis_sizes(&self) -> &[usize] {
        &self.axes
    }

    pub fn number_dimensions(&self) -> usize {
        self.axes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_coords_bijection_2d() {
        let table = DirectionTable::new(Dims::new(2, 3, 0));
        for s in 0..table.number_children() {
            let coords = table.sibling_number_to_coords(s);
            assert_eq!(table.coords_to_sibling_number(&coords), s);
        }
    }

    #[test]
    fn face_direction_count_matches_dimensionality() {
        assert_eq!(DirectionTable::new(Dims::new(2, 0, 0)).number_of_directions(), 2);
        assert_eq!(DirectionTable::new(Dims::new(2, 2, 0)).number_of_directions(), 8);
        assert_eq!(DirectionTable::new(Dims::new(2, 2, 2)).number_of_directions(), 26);
    }

    #[test]
    fn direct_neighbor_within_same_oct_2x2() {
        let table = DirectionTable::new(Dims::new(2, 2, 0));
        // sibling 0 = (0,0); direction 0 = +x face.
        let (same_parent, neighbor) = table.direct_neighbor_cell_info(0, 0);
        assert!(same_parent);
        assert_eq!(neighbor, table.coords_to_sibling_number(&[1, 0]));
    }

    #[test]
    fn direct_neighbor_exits_through_face() {
        let table = DirectionTable::new(Dims::new(2, 2, 0));
        // sibling at (1,0) exits through +x face to the mirrored (0,0) sibling.
        let sibling = table.coords_to_sibling_number(&[1, 0]);
        let (same_parent, neighbor) = table.direct_neighbor_cell_info(sibling, 0);
        assert!(!same_parent);
        assert_eq!(neighbor, table.coords_to_sibling_number(&[0, 0]));
    }

    #[test]
    fn plane_decomposes_into_two_faces() {
        let table = DirectionTable::new(Dims::new(2, 2, 0));
        let edge_dir = table.number_of_face_directions();
        let (d1, d2) = table.plane_to_direct_dirs(edge_dir);
        assert!(table.is_face_direction(d1));
        assert!(table.is_face_direction(d2));
    }

    #[test]
    fn corner_sibling_is_a_single_child_in_3d() {
        let table = DirectionTable::new(Dims::new(2, 2, 2));
        let corner_dir = table.number_of_directions() - 1;
        assert_eq!(table.dir_sibling_numbers(corner_dir).len(), 1);
    }
}
