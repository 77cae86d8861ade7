//! Morton (Z-order) curve: a fixed per-axis permutation, no per-oct
//! state (spec.md §3, "a fixed permutation derived from an axis-order
//! triple... No mother-orientation tracking"), grounded on
//! `tamra/includes/core/iterator/MortonIterator.h`.
//!
//! An oct's sibling number is already the mixed-radix digit
//! `i + N1*j + N1*N2*k` in a fixed x/y/z axis order (spec.md §3). Morton
//! re-derives the *curve* order from the same coordinates read off in a
//! possibly different axis order (e.g. "XZY"), which is the entirety of
//! what distinguishes Morton orders from raw sibling numbers.

use crate::core::direction::DirectionTable;

use super::SpaceFillingCurve;

/// The Z-order curve for one forest's dimensionality, parameterized by
/// the axis order used to interleave coordinates into a curve position.
#[derive(Debug, Clone)]
pub struct Morton {
    /// A permutation of `0..d`: `axis_order[0]` is the least-significant
    /// digit of the curve position.
    axis_order: Vec<usize>,
}

impl Morton {
    /// Builds a Morton curve from an explicit axis order (a permutation
    /// of `0..axis_order.len()`).
    pub fn new(axis_order: Vec<usize>) -> Self {
        let mut sorted = axis_order.clone();
        sorted.sort_unstable();
        assert!(
            sorted.iter().enumerate().all(|(i, &a)| i == a),
            "axis_order must be a permutation of 0..d, got {axis_order:?}"
        );
        Morton { axis_order }
    }

    /// The canonical "XYZ" ordering for `d` present axes: curve position
    /// digits match sibling-number digits exactly, so Morton order
    /// equals sibling number.
    pub fn xyz(number_dimensions: usize) -> Self {
        Morton { axis_order: (0..number_dimensions).collect() }
    }
}

impl SpaceFillingCurve for Morton {
    type Orientation = ();

    fn root_orientation(&self) -> Self::Orientation {}

    fn order_to_sibling(&self, table: &DirectionTable, _orientation: (), order: usize) -> usize {
        let axes = table.axis_sizes();
        let permuted_sizes: Vec<usize> = self.axis_order.iter().map(|&a| axes[a]).collect();
        let mut remaining = order;
        let mut coords = vec![0usize; axes.len()];
        for (i, &axis) in self.axis_order.iter().enumerate() {
            coords[axis] = remaining % permuted_sizes[i];
            remaining /= permuted_sizes[i];
        }
        table.coords_to_sibling_number(&coords)
    }

    fn sibling_to_order(&self, table: &DirectionTable, _orientation: (), sibling: usize) -> usize {
        let coords = table.sibling_number_to_coords(sibling);
        let axes = table.axis_sizes();
        let mut order = 0usize;
        let mut stride = 1usize;
        for &axis in &self.axis_order {
            order += coords[axis] * stride;
            stride *= axes[axis];
        }
        order
    }

    fn child_orientation(&self, _table: &DirectionTable, _orientation: (), _order: usize) -> Self::Orientation {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forest::Dims;

    #[test]
    fn xyz_order_matches_sibling_number() {
        let table = DirectionTable::new(Dims::new(2, 2, 2));
        let morton = Morton::xyz(3);
        for sibling in 0..table.number_children() {
            assert_eq!(morton.sibling_to_order(&table, (), sibling), sibling);
            assert_eq!(morton.order_to_sibling(&table, (), sibling), sibling);
        }
    }

    #[test]
    fn order_sibling_round_trip_for_a_nontrivial_axis_order() {
        let table = DirectionTable::new(Dims::new(2, 3, 4));
        let morton = Morton::new(vec![2, 0, 1]);
        for sibling in 0..table.number_children() {
            let order = morton.sibling_to_order(&table, (), sibling);
            assert_eq!(morton.order_to_sibling(&table, (), order), sibling);
        }
    }

    #[test]
    #[should_panic(expected = "permutation")]
    fn rejects_a_non_permutation_axis_order() {
        Morton::new(vec![0, 0, 2]);
    }
}
