//! `forest_mesh`: a distributed, adaptive tree-structured mesh for
//! scientific computing over 1/2/3-dimensional Cartesian domains.
//!
//! A forest of root cells is recursively subdivided into a tree of
//! "octs" (generalized `2^d`-children blocks), kept refinement-balanced
//! (2:1) and, across a message-passing cluster, load-balanced and
//! surrounded with a one-cell ghost layer so that stencil operators on
//! leaf cells can reach remote neighbors.
//!
//! The typical driver sequence is:
//!
//! ```text
//! build roots + neighbor wiring
//!     -> mesh_at_min_level
//!     -> edit indicators
//!     -> refine / coarsen
//!     -> load_balance
//!     -> build_ghost_layer
//!     -> user computation reads neighbors
//!     -> exchange_ghost_values
//!     -> repeat
//! ```

pub mod constants;
pub mod core;
pub mod manager;
pub mod parallel;
pub mod payload;
pub mod prelude;
pub mod utils;

pub use crate::core::cell::CellRef;
pub use crate::core::cell_id::{CellId, CellIdManager};
pub use crate::core::direction::DirectionTable;
pub use crate::core::forest::{Dims, Forest, RootEntry};
pub use crate::core::indicator::{Action, Indicator, Ownership};
pub use crate::core::oct::OctRef;
pub use crate::core::sfc::{hilbert::Hilbert, iterator::ForestIterator, morton::Morton, SpaceFillingCurve};
pub use crate::manager::balance::{assess, load_balance, load_balance_with_default_threshold, BalanceAssessment};
pub use crate::manager::coarsen::coarsen;
pub use crate::manager::ghost::{build_ghost_layer, continue_task, exchange_ghost_values, GhostConflictStrategy, GhostTask, OwnedConflictStrategy};
pub use crate::manager::min_level::{mesh_at_min_level_partitioned, mesh_at_min_level_serial};
pub use crate::manager::refine::refine;
pub use crate::parallel::{Collective, LocalCollective, ReduceOp, ThreadedCollective};
pub use crate::payload::CellPayload;
