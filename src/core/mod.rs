//! The cell/oct topology, CellId algebra, and space-filling-curve
//! traversal: the core data model (spec.md §3/§4.1-4.4).

pub mod cell;
pub mod cell_id;
pub mod direction;
pub mod forest;
pub mod indicator;
pub mod oct;
pub mod sfc;
