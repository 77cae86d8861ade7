//! Cell identifiers: path encoding, the two wire formats, and equal
//! partitioning (spec.md §3, §4.3, §6).
//!
//! Grounded on `tamra/includes/core/manager/CellIdManager.h` (the plain,
//! length-prefixed encoding) and
//! `tamra/includes/core/manager/BitStackedCellIdManager.h` (the
//! bit-stacked encoding). `bitvec` (a teacher dependency) backs the
//! bit-stacked packer/unpacker.

use bitvec::prelude::*;

/// A cell's path from its root: `path[0]` is the root index, `path[1..]`
/// are the SFC orders of each subsequent child. Both wire encodings are
/// built from, and decoded back to, this representation.
pub type OrderPath = Vec<u32>;

/// The two wire encodings spec.md §3/§6 requires.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CellId {
    /// One machine word per path component, length-prefixed: `[L, root,
    /// o_1, ..., o_L]`.
    Plain(Vec<u32>),
    /// Bit-stacked: `[0..B_level)` = L, `[B_level..B_level+B_root)` =
    /// root, then `L` child-order fields of `bits_per_child` bits each,
    /// packed MSB-first, spilling across 64-bit words.
    Packed(Vec<u64>),
}

/// Outcome of comparing two order-paths against each other, terminating
/// at the first differing level (spec.md §4.3, "tri-valued comparator").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOrdering {
    Less,
    Greater,
    Equal,
    /// One path is a strict prefix of the other — the shorter path's
    /// subtree contains the longer path's cell, so "before/after" isn't
    /// decidable without descending further.
    Indeterminate,
}

fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()).max(1)
    }
}

/// Packs/unpacks [`OrderPath`]s for one forest's shape, and computes
/// equal-partition fences (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct CellIdManager {
    max_level: u32,
    n_roots: usize,
    number_children: usize,
    bits_for_level: u32,
    bits_for_root: u32,
    bits_per_child: u32,
}

impl CellIdManager {
    pub fn new(max_level: u32, n_roots: usize, number_children: usize) -> Self {
        assert!(n_roots > 0, "a forest needs at least one root");
        CellIdManager {
            max_level,
            n_roots,
            number_children,
            bits_for_level: ceil_log2(max_level as usize + 1).max(1),
            bits_for_root: ceil_log2(n_roots).max(1),
            bits_per_child: ceil_log2(number_children).max(1),
        }
    }

    pub fn order_path_to_id_plain(&self, path: &OrderPath) -> CellId {
        assert!(!path.is_empty(), "an order path always has at least a root index");
        let l = (path.len() - 1) as u32;
        let mut words = vec![l, path[0]];
        words.extend_from_slice(&path[1..]);
        CellId::Plain(words)
    }

    pub fn id_to_order_path_plain(&self, id: &CellId) -> OrderPath {
        let CellId::Plain(words) = id else { panic!("expected a Plain-encoded CellId") };
        let l = words[0] as usize;
        assert_eq!(words.len(), l + 2, "malformed Plain CellId: length prefix does not match word count");
        words[1..].to_vec()
    }

    pub fn order_path_to_id_packed(&self, path: &OrderPath) -> CellId {
        assert!(!path.is_empty(), "an order path always has at least a root index");
        let l = (path.len() - 1) as u32;
        let mut bits: BitVec<u64, Msb0> = BitVec::new();
        Self::push_bits(&mut bits, l as u64, self.bits_for_level);
        Self::push_bits(&mut bits, path[0] as u64, self.bits_for_root);
        for &order in &path[1..] {
            Self::push_bits(&mut bits, order as u64, self.bits_per_child);
        }
        CellId::Packed(bits.into_vec())
    }

    pub fn id_to_order_path_packed(&self, id: &CellId) -> OrderPath {
        let CellId::Packed(words) = id else { panic!("expected a Packed-encoded CellId") };
        let bits: &BitSlice<u64, Msb0> = BitSlice::from_slice(words);
        let mut cursor = 0usize;
        let l = Self::read_bits(bits, &mut cursor, self.bits_for_level) as usize;
        let root = Self::read_bits(bits, &mut cursor, self.bits_for_root) as u32;
        let mut path = vec![root];
        for _ in 0..l {
            path.push(Self::read_bits(bits, &mut cursor, self.bits_per_child) as u32);
        }
        path
    }

    fn push_bits(bits: &mut BitVec<u64, Msb0>, value: u64, n_bits: u32) {
        for i in (0..n_bits).rev() {
            bits.push((value >> i) & 1 == 1);
        }
    }

    fn read_bits(bits: &BitSlice<u64, Msb0>, cursor: &mut usize, n_bits: u32) -> u64 {
        let mut value = 0u64;
        for _ in 0..n_bits {
            value = (value << 1) | (bits[*cursor] as u64);
            *cursor += 1;
        }
        value
    }

    pub fn to_child(&self, path: &mut OrderPath, order: u32) {
        assert!(path.len() <= self.max_level as usize, "order path already at max_level");
        path.push(order);
    }

    pub fn to_parent(&self, path: &mut OrderPath) -> bool {
        if path.len() > 1 {
            path.pop();
            true
        } else {
            false
        }
    }

    pub fn to_root(&self, path: &mut OrderPath, root: u32) {
        assert!((root as usize) < self.n_roots, "root index out of range");
        path.clear();
        path.push(root);
    }

    pub fn reset_cell_id(&self, path: &mut OrderPath) {
        path.truncate(1);
    }

    /// Tri-valued comparison of two order-paths, per spec.md §4.3.
    pub fn compare(&self, a: &OrderPath, b: &OrderPath) -> PrefixOrdering {
        let common = a.len().min(b.len());
        for i in 0..common {
            if a[i] != b[i] {
                return if a[i] < b[i] { PrefixOrdering::Less } else { PrefixOrdering::Greater };
            }
        }
        if a.len() == b.len() {
            PrefixOrdering::Equal
        } else {
            PrefixOrdering::Indeterminate
        }
    }

    pub fn cell_id_lt(&self, a: &OrderPath, b: &OrderPath) -> bool {
        self.compare(a, b) == PrefixOrdering::Less
    }

    pub fn cell_id_lte(&self, a: &OrderPath, b: &OrderPath) -> bool {
        matches!(self.compare(a, b), PrefixOrdering::Less | PrefixOrdering::Equal)
    }

    pub fn cell_id_gt(&self, a: &OrderPath, b: &OrderPath) -> bool {
        self.compare(a, b) == PrefixOrdering::Greater
    }

    pub fn cell_id_gte(&self, a: &OrderPath, b: &OrderPath) -> bool {
        matches!(self.compare(a, b), PrefixOrdering::Greater | PrefixOrdering::Equal)
    }

    /// Deterministically returns `n_processes + 1` order-paths of length
    /// `level + 1`, such that the number of `level`-leaves between
    /// consecutive fences differs by at most one (spec.md §4.3,
    /// `getEqualPartitions`). The last fence is a one-past-the-end
    /// sentinel with `root == n_roots` (mirroring
    /// [`crate::core::sfc::iterator::ForestIterator`]'s end state).
    ///
    /// This is purely arithmetic — it does not need to know which
    /// physical sibling each order maps to, since "order" is by
    /// definition the digit of a cell's position along the curve within
    /// its parent, for whichever curve produced it.
    pub fn get_equal_partitions(&self, level: u32, n_processes: usize) -> Vec<OrderPath> {
        assert!(n_processes > 0, "need at least one process");
        let leaves_per_root = self.number_children.pow(level);
        let total = self.n_roots * leaves_per_root;

        (0..=n_processes)
            .map(|p| {
                let position = p * total / n_processes;
                self.position_to_order_path(position, level, leaves_per_root)
            })
            .collect()
    }

    /// Successor of `path` along the SFC, carrying into coarser digits
    /// and finally the root index (the single-step generalization of
    /// [`CellIdManager::get_equal_partitions`]'s fence arithmetic). A
    /// path whose root carry overflows past `n_roots` returns the
    /// one-past-the-end sentinel (`root == n_roots`, every other digit
    /// `0`), mirroring `get_equal_partitions`'s last fence.
    pub fn increment_order_path(&self, path: &OrderPath) -> OrderPath {
        let mut result = path.clone();
        let mut i = result.len();
        loop {
            if i == 0 {
                let mut sentinel = vec![self.n_roots as u32];
                sentinel.extend(std::iter::repeat(0u32).take(path.len().saturating_sub(1)));
                return sentinel;
            }
            i -= 1;
            let radix = if i == 0 { self.n_roots } else { self.number_children };
            result[i] += 1;
            if (result[i] as usize) < radix {
                return result;
            }
            result[i] = 0;
        }
    }

    fn position_to_order_path(&self, position: usize, level: u32, leaves_per_root: usize) -> OrderPath {
        let root = position / leaves_per_root;
        let mut remainder = position % leaves_per_root;
        let mut digits = vec![0u32; level as usize];
        for i in (0..level as usize).rev() {
            digits[i] = (remainder % self.number_children) as u32;
            remainder /= self.number_children;
        }
        let mut path = vec![root as u32];
        path.extend(digits);
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_round_trips() {
        let manager = CellIdManager::new(5, 3, 4);
        let path = vec![2, 0, 3, 1];
        let id = manager.order_path_to_id_plain(&path);
        assert_eq!(manager.id_to_order_path_plain(&id), path);
    }

    #[test]
    fn packed_round_trips_for_many_paths() {
        let manager = CellIdManager::new(10, 5, 8);
        for path in [vec![0u32], vec![4, 7], vec![2, 0, 5, 3, 1, 6, 2, 1, 0, 7]] {
            let id = manager.order_path_to_id_packed(&path);
            assert_eq!(manager.id_to_order_path_packed(&id), path);
        }
    }

    #[test]
    fn compare_detects_prefix_relationship() {
        let manager = CellIdManager::new(5, 1, 4);
        let parent = vec![0, 1];
        let child = vec![0, 1, 2];
        assert_eq!(manager.compare(&parent, &child), PrefixOrdering::Indeterminate);
    }

    #[test]
    fn compare_orders_siblings_by_first_difference() {
        let manager = CellIdManager::new(5, 1, 4);
        assert_eq!(manager.compare(&vec![0, 1, 0], &vec![0, 2, 0]), PrefixOrdering::Less);
    }

    #[test]
    fn increment_order_path_carries_through_digits_and_roots() {
        let manager = CellIdManager::new(5, 2, 4);
        assert_eq!(manager.increment_order_path(&vec![0, 0, 0]), vec![0, 0, 1]);
        assert_eq!(manager.increment_order_path(&vec![0, 0, 3]), vec![0, 1, 0]);
        assert_eq!(manager.increment_order_path(&vec![0, 3, 3]), vec![1, 0, 0]);
        assert_eq!(manager.increment_order_path(&vec![1, 3, 3]), vec![2, 0, 0]);
    }

    #[test]
    fn equal_partitions_cover_the_whole_range_and_balance_within_one() {
        let manager = CellIdManager::new(4, 1, 4);
        let fences = manager.get_equal_partitions(2, 3);
        assert_eq!(fences.len(), 4);
        assert_eq!(fences[0], vec![0, 0, 0]);
        // total leaves = 16, split across 3 -> counts in {5, 6}.
        let positions: Vec<usize> = (0..3)
            .map(|p| {
                let a = &fences[p];
                let b = &fences[p + 1];
                // crude count via brute-force digit decoding comparison
                let to_pos = |path: &OrderPath| path[1] as usize * 4 + path[2] as usize;
                to_pos(b) - to_pos(a)
            })
            .collect();
        assert!(positions.iter().all(|&c| c == 5 || c == 6));
    }
}
