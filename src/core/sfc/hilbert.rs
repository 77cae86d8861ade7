//! Hilbert curve: per-oct orientation carried as an `(entry, direction)`
//! pair and propagated to children (spec.md §3, "per-oct orientation
//! chosen from a finite set (2^d corners x d rotations), with tables
//! mapping (mother_orientation, order)->(sibling_index,
//! child_orientation)"), grounded on
//! `tamra/includes/core/iterator/HilbertIterator.h`.
//!
//! Implements the generalized n-dimensional Hilbert curve via the
//! entry-point/direction state-transition construction (Hamilton,
//! *Compact Hilbert Indices*, 2006): each oct carries an `entry` vertex
//! (a `d`-bit reflection mask, `2^d` choices) and a `direction` axis
//! (`d` choices) describing how the canonical Gray-code traversal of
//! the oct's children is rotated and reflected to continue the curve
//! from whichever corner the parent handed off at. Only binary
//! (2-way) per-axis subdivision is defined for a Hilbert curve in this
//! construction — forests with any other per-axis child count must use
//! [`super::morton::Morton`] instead.

use crate::core::direction::DirectionTable;

use super::SpaceFillingCurve;

/// The `(entry, direction)` state threaded down the oct tree.
/// `entry` is a `d`-bit reflection mask; `direction` is the rotation
/// axis in `0..d`. Cardinality `2^d * d`, matching spec.md's count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HilbertOrientation {
    entry: usize,
    direction: usize,
}

/// The Hilbert curve for one forest's dimensionality. Stateless itself
/// (all per-oct state lives in [`HilbertOrientation`]); `d` is read off
/// the [`DirectionTable`] passed to every method.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hilbert;

fn gray_code(w: usize) -> usize {
    w ^ (w >> 1)
}

/// Inverse of [`gray_code`]: standard MSB-to-LSB prefix-XOR decode.
fn inverse_gray_code(g: usize, d: usize) -> usize {
    let mut w = 0usize;
    let mut carry = 0usize;
    for i in (0..d).rev() {
        let gi = (g >> i) & 1;
        carry ^= gi;
        w |= carry << i;
    }
    w
}

fn rotate_left(bits: usize, r: usize, d: usize) -> usize {
    if d == 0 {
        return bits;
    }
    let r = r % d;
    if r == 0 {
        return bits;
    }
    let mask = (1usize << d) - 1;
    ((bits << r) | (bits >> (d - r))) & mask
}

fn rotate_right(bits: usize, r: usize, d: usize) -> usize {
    if d == 0 {
        return bits;
    }
    let r = r % d;
    if r == 0 {
        return bits;
    }
    let mask = (1usize << d) - 1;
    ((bits >> r) | (bits << (d - r))) & mask
}

/// Maps a canonical Gray-code point to the actual point visited under
/// `(entry, direction)`.
fn inverse_transform(point: usize, entry: usize, direction: usize, d: usize) -> usize {
    rotate_left(point, direction, d) ^ entry
}

/// Inverse of [`inverse_transform`].
fn transform(point: usize, entry: usize, direction: usize, d: usize) -> usize {
    rotate_right(point ^ entry, direction, d)
}

/// The entry vertex of the sub-hypercube visited at curve position `i`.
fn entry_point(i: usize) -> usize {
    if i == 0 {
        0
    } else {
        gray_code(2 * ((i - 1) / 2))
    }
}

/// The rotation axis introduced by traversing position `i`.
fn intra_direction(i: usize, d: usize) -> usize {
    if i == 0 {
        0
    } else if i % 2 == 0 {
        (((i - 1) as u32).trailing_ones() as usize) % d
    } else {
        ((i as u32).trailing_ones() as usize) % d
    }
}

fn assert_binary(table: &DirectionTable) {
    assert!(
        table.axis_sizes().iter().all(|&s| s == 2),
        "Hilbert curves are only defined for binary (2-way) per-axis subdivision, got axis sizes {:?}",
        table.axis_sizes()
    );
}

impl SpaceFillingCurve for Hilbert {
    type Orientation = HilbertOrientation;

    fn root_orientation(&self) -> Self::Orientation {
        HilbertOrientation { entry: 0, direction: 0 }
    }

    fn order_to_sibling(&self, table: &DirectionTable, orientation: Self::Orientation, order: usize) -> usize {
        assert_binary(table);
        let d = table.number_dimensions();
        let canonical = gray_code(order);
        inverse_transform(canonical, orientation.entry, orientation.direction, d)
    }

    fn sibling_to_order(&self, table: &DirectionTable, orientation: Self::Orientation, sibling: usize) -> usize {
        assert_binary(table);
        let d = table.number_dimensions();
        let canonical = transform(sibling, orientation.entry, orientation.direction, d);
        inverse_gray_code(canonical, d)
    }

    fn child_orientation(&self, table: &DirectionTable, orientation: Self::Orientation, order: usize) -> Self::Orientation {
        assert_binary(table);
        let d = table.number_dimensions();
        let entry_next = orientation.entry ^ rotate_left(entry_point(order), orientation.direction + 1, d);
        let direction_next = (orientation.direction + intra_direction(order, d) + 1) % d;
        HilbertOrientation { entry: entry_next, direction: direction_next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forest::Dims;

    #[test]
    fn order_sibling_round_trip_at_every_orientation_reachable_within_two_levels() {
        let table = DirectionTable::new(Dims::new(2, 2, 2));
        let hilbert = Hilbert;
        let root = hilbert.root_orientation();
        let mut orientations = vec![root];
        for order in 0..table.number_children() {
            orientations.push(hilbert.child_orientation(&table, root, order));
        }
        for orientation in orientations {
            for sibling in 0..table.number_children() {
                let order = hilbert.sibling_to_order(&table, orientation, sibling);
                assert_eq!(hilbert.order_to_sibling(&table, orientation, order), sibling);
            }
            for order in 0..table.number_children() {
                let sibling = hilbert.order_to_sibling(&table, orientation, order);
                assert_eq!(hilbert.sibling_to_order(&table, orientation, sibling), order);
            }
        }
    }

    #[test]
    fn consecutive_orders_visit_every_sibling_exactly_once() {
        let table = DirectionTable::new(Dims::new(2, 2, 0));
        let hilbert = Hilbert;
        let orientation = hilbert.root_orientation();
        let mut visited: Vec<usize> = (0..table.number_children()).map(|o| hilbert.order_to_sibling(&table, orientation, o)).collect();
        visited.sort_unstable();
        assert_eq!(visited, vec![0, 1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "binary")]
    fn rejects_non_binary_dims() {
        let table = DirectionTable::new(Dims::new(3, 3, 0));
        let hilbert = Hilbert;
        hilbert.order_to_sibling(&table, hilbert.root_orientation(), 0);
    }
}
