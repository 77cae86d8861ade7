//! The per-cell user payload capability.
//!
//! spec.md treats the payload as an external collaborator: "an opaque
//! byte-packable value with a user-supplied extrapolation/interpolation
//! function and a load contribution". This merges the original's
//! `ParallelData` (serialize/deserialize/size) and `AbstractCellData`
//! (`getLoad`) into one trait, grounded on
//! `tamra/includes/parallel/ParallelData.h` and
//! `tamra/includes/core/AbstractCellData.h`.

/// A value that can ride on a variadic `double`-typed collective and
/// that contributes a load weight to [`crate::manager::balance`].
///
/// Implementors are expected to be small, `Clone`-cheap values (a
/// handful of doubles, typically); the mesh never interprets the
/// payload beyond this trait.
pub trait CellPayload: Clone + Send + Sync + Default {
    /// Flatten this payload to the wire representation used by the
    /// variadic double-typed collectives (spec.md §6).
    fn to_vector_of_data(&self) -> Vec<f64>;

    /// Reconstruct a payload from its wire representation. Implementors
    /// should panic if `data` does not have the length advertised by
    /// [`CellPayload::data_size`] — this is the "serialization size
    /// mismatch" contract violation from spec.md §7.
    fn from_vector_of_data(data: &[f64]) -> Self;

    /// Number of `f64` slots [`CellPayload::to_vector_of_data`] returns.
    /// Implementations whose size can vary per-instance must still
    /// return a value consistent with the vector actually produced.
    fn data_size(&self) -> usize;

    /// Load contribution used by [`crate::manager::balance`]. `is_leaf`
    /// distinguishes a leaf's real contribution from a parent's (parents
    /// are not normally weighed, but the callback is still invoked with
    /// `is_leaf = false` during some traversals).
    fn load(&self, is_leaf: bool) -> f64;
}

/// The simplest possible payload: a single scalar, as spec.md §6 notes
/// ("The defaults accept a single scalar; richer payloads are
/// expected.").
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Scalar(pub f64);

impl CellPayload for Scalar {
    fn to_vector_of_data(&self) -> Vec<f64> {
        vec![self.0]
    }

    fn from_vector_of_data(data: &[f64]) -> Self {
        assert_eq!(data.len(), 1, "Scalar payload expects exactly one f64, got {}", data.len());
        Scalar(data[0])
    }

    fn data_size(&self) -> usize {
        1
    }

    fn load(&self, _is_leaf: bool) -> f64 {
        1.0
    }
}

/// Populates children from a parent's payload on `split` and on newly
/// materialized ghost parents (spec.md §6, "Extrapolation").
pub type ExtrapolateFn<'a, P> = dyn Fn(&P) -> P + 'a;

/// Populates a parent from its children's payloads on `coarsen`
/// (spec.md §6, "Interpolation").
pub type InterpolateFn<'a, P> = dyn Fn(&[P]) -> P + 'a;

/// Default extrapolation: copy the parent's payload unchanged to each
/// child.
pub fn copy_extrapolate<P: CellPayload>(parent: &P) -> P {
    parent.clone()
}

/// Default interpolation: average the children's loads into a
/// `Scalar`-compatible value is not generally well-typed for an
/// arbitrary `P`, so the default simply keeps the first child's
/// payload. Callers with real physics should supply their own.
pub fn first_child_interpolate<P: CellPayload>(children: &[P]) -> P {
    children
        .first()
        .cloned()
        .unwrap_or_default()
}
