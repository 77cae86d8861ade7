//! The collective-operation interface (spec.md §6) and its concrete
//! implementations.
//!
//! There is no MPI crate in this crate's dependency corpus, so the
//! "cluster's message-passing library" spec.md §6 describes stays an
//! external seam: [`collective::Collective`] is the trait managers code
//! against, [`local::LocalCollective`] is the N=1 no-op spec.md §5
//! requires, and [`threaded::ThreadedCollective`] simulates N>1 ranks
//! over OS threads so the manager algorithms can be exercised and
//! tested end to end without a real cluster.

pub mod collective;
pub mod local;
pub mod threaded;

pub use collective::{Collective, ReduceOp};
pub use local::LocalCollective;
pub use threaded::ThreadedCollective;
