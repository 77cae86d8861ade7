//! Common imports for working with `forest_mesh`.

pub use crate::core::cell::CellRef;
pub use crate::core::cell_id::{CellId, CellIdManager};
pub use crate::core::forest::{Dims, Forest, RootEntry};
pub use crate::core::indicator::{Action, Indicator, Ownership};
pub use crate::core::oct::OctRef;
pub use crate::core::sfc::{hilbert::Hilbert, iterator::ForestIterator, morton::Morton, SpaceFillingCurve};
pub use crate::manager::balance::{assess, load_balance, load_balance_with_default_threshold, BalanceAssessment};
pub use crate::manager::coarsen::coarsen;
pub use crate::manager::ghost::{build_ghost_layer, continue_task, exchange_ghost_values, GhostConflictStrategy, GhostTask, OwnedConflictStrategy};
pub use crate::manager::min_level::{mesh_at_min_level_partitioned, mesh_at_min_level_serial};
pub use crate::manager::refine::refine;
pub use crate::parallel::collective::Collective;
pub use crate::parallel::{LocalCollective, ReduceOp, ThreadedCollective};
pub use crate::payload::CellPayload;
