//! The four distributed mesh managers (spec.md §4.5-§4.9), each a free
//! function over a `&mut Forest` plus (where relevant) a `&dyn
//! Collective` — translated from the original's small manager objects
//! (three integers and a communicator reference) into plain functions,
//! since Rust favors functions over structs with no real state of their
//! own.

pub mod balance;
pub mod coarsen;
pub mod ghost;
pub mod min_level;
pub mod refine;
