//! Bit-stacked array compression (spec.md §4.8/§6, "Structure
//! compression"), grounded on `tamra/includes/utils/compression_utils.h`.
//!
//! Packs an array of small unsigned values into a dense bit stream: the
//! array's length is stored first as a full word, then each value takes
//! exactly `bits_for(max_value)` bits, packed MSB-first and spilling
//! across 32-bit words. This is the general-purpose encoding spec.md's
//! "Structure compression" describes for a contiguous SFC run's
//! bit-packed level list; neither [`crate::manager::balance`] nor
//! [`crate::manager::ghost`] currently calls it, since both managers
//! only ever move whole owned leaves and hand-roll a simpler per-leaf
//! length-prefix encoding instead (see DESIGN.md's "Balance/Ghost
//! wire-format simplification"). Kept as infrastructure a richer
//! subtree-batching scheme could build on.

use bitvec::prelude::*;

fn bits_for(max_value: u32) -> u32 {
    (u32::BITS - max_value.leading_zeros()).max(1)
}

/// Compresses `values` (each `<= max_value`) into `[len, packed_words...]`.
pub fn compress_unsigned_vector(values: &[u32], max_value: u32) -> Vec<u32> {
    let width = bits_for(max_value);
    let mut bits: BitVec<u32, Msb0> = BitVec::new();
    for &v in values {
        assert!(v <= max_value, "value {v} exceeds max_value {max_value}");
        for i in (0..width).rev() {
            bits.push((v >> i) & 1 == 1);
        }
    }
    let mut result = vec![values.len() as u32];
    result.extend(bits.into_vec());
    result
}

/// Inverse of [`compress_unsigned_vector`].
pub fn uncompress_unsigned_vector(compressed: &[u32], max_value: u32) -> Vec<u32> {
    let width = bits_for(max_value);
    let len = compressed[0] as usize;
    let bits: &BitSlice<u32, Msb0> = BitSlice::from_slice(&compressed[1..]);
    let mut cursor = 0usize;
    let mut result = Vec::with_capacity(len);
    for _ in 0..len {
        let mut v = 0u32;
        for _ in 0..width {
            v = (v << 1) | (bits[cursor] as u32);
            cursor += 1;
        }
        result.push(v);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_empty_vector() {
        let compressed = compress_unsigned_vector(&[], 7);
        assert_eq!(uncompress_unsigned_vector(&compressed, 7), Vec::<u32>::new());
    }

    #[test]
    fn round_trips_values_near_the_max() {
        let values = vec![0, 3, 7, 1, 7, 0];
        let compressed = compress_unsigned_vector(&values, 7);
        assert_eq!(uncompress_unsigned_vector(&compressed, 7), values);
    }

    #[test]
    fn packs_tighter_than_one_word_per_value() {
        let values = vec![1u32; 64];
        let compressed = compress_unsigned_vector(&values, 1);
        assert!(compressed.len() < values.len());
    }

    #[test]
    #[should_panic(expected = "exceeds max_value")]
    fn rejects_a_value_above_max() {
        compress_unsigned_vector(&[8], 7);
    }
}
