//! Shared numeric limits.
//!
//! Mirrors `clam`'s bare `constants` module (a handful of named
//! constants, no logic).

/// Deepest level a `CellId` path can reach. Bounded in practice (see
/// spec.md §9, "the depth is bounded by `max_level` (≤ ~20 in
/// practice)"); used to size the bit-stacked encoding's level field.
pub const MAX_LEVEL_BOUND: u32 = 62;

/// Default threshold for `Balance::is_load_balancing_needed`: the
/// maximum fraction, of the total load, that any rank's cumulative
/// prefix may deviate from its ideal `(p+1)/n_proc` share before a
/// rebalance is triggered.
pub const DEFAULT_MAX_PCT_UNBALANCE: f64 = 0.05;
