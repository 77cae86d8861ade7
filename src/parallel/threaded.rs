//! A `Collective` implementation that simulates `N` ranks as OS threads
//! sharing mailboxes guarded by a barrier, so the manager algorithms can
//! be driven by real, if simulated, multi-rank tests without an MPI
//! runtime in the dependency corpus (see SPEC_FULL.md §5).
//!
//! Every call is bulk-synchronous: each rank writes its own slot(s),
//! waits at a barrier, reads the slots it needs, then waits at a second
//! barrier before the next call is allowed to reuse the mailboxes. This
//! mirrors spec.md §5's ordering guarantee that exchanges preserve
//! sender-relative order within each (sender, receiver) pair, since no
//! rank can race ahead into the next collective before every rank has
//! finished reading the current one.

use std::sync::{Arc, Barrier, Mutex};

use super::collective::{Collective, ReduceOp};

/// Shared state for one simulated cluster. Constructed once via
/// [`ThreadedCollective::spawn`] and handed out one handle per rank.
struct ClusterChannels {
    size: usize,
    entry: Barrier,
    exit: Barrier,
    scalars: Mutex<Vec<f64>>,
    vectors: Mutex<Vec<Vec<f64>>>,
    /// `mailbox[i][j]` is the vector rank `i` addressed to rank `j`.
    mailbox: Mutex<Vec<Vec<Vec<f64>>>>,
    broadcast_slot: Mutex<Vec<f64>>,
}

impl ClusterChannels {
    fn new(size: usize) -> Self {
        ClusterChannels {
            size,
            entry: Barrier::new(size),
            exit: Barrier::new(size),
            scalars: Mutex::new(vec![0.0; size]),
            vectors: Mutex::new(vec![Vec::new(); size]),
            mailbox: Mutex::new(vec![vec![Vec::new(); size]; size]),
            broadcast_slot: Mutex::new(Vec::new()),
        }
    }
}

/// One rank's handle onto a simulated cluster of `size` ranks.
#[derive(Clone)]
pub struct ThreadedCollective {
    rank: usize,
    channels: Arc<ClusterChannels>,
}

impl ThreadedCollective {
    /// Build one handle per rank for a simulated cluster of `size`
    /// ranks. Callers typically move one handle into each of `size`
    /// `std::thread::scope` threads.
    pub fn spawn(size: usize) -> Vec<Self> {
        assert!(size > 0, "a cluster needs at least one rank");
        let channels = Arc::new(ClusterChannels::new(size));
        (0..size)
            .map(|rank| ThreadedCollective {
                rank,
                channels: channels.clone(),
            })
            .collect()
    }

    /// Run `body` on `size` simulated ranks in parallel OS threads and
    /// collect the per-rank results in rank order. Convenience wrapper
    /// around [`ThreadedCollective::spawn`] + `std::thread::scope` for
    /// tests.
    pub fn run<T, F>(size: usize, body: F) -> Vec<T>
    where
        T: Send,
        F: Fn(ThreadedCollective) -> T + Sync,
    {
        let handles = Self::spawn(size);
        std::thread::scope(|scope| {
            let threads: Vec<_> = handles
                .into_iter()
                .map(|handle| scope.spawn(|| body(handle)))
                .collect();
            threads.into_iter().map(|t| t.join().expect("rank thread panicked")).collect()
        })
    }
}

impl Collective for ThreadedCollective {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.channels.size
    }

    fn allgather_scalar(&self, value: f64) -> Vec<f64> {
        {
            let mut slots = self.channels.scalars.lock().expect("cluster mutex poisoned");
            slots[self.rank] = value;
        }
        self.channels.entry.wait();
        let result = self.channels.scalars.lock().expect("cluster mutex poisoned").clone();
        self.channels.exit.wait();
        result
    }

    fn allgatherv(&self, values: &[f64]) -> (Vec<f64>, Vec<usize>) {
        {
            let mut slots = self.channels.vectors.lock().expect("cluster mutex poisoned");
            slots[self.rank] = values.to_vec();
        }
        self.channels.entry.wait();
        let (flat, lengths) = {
            let slots = self.channels.vectors.lock().expect("cluster mutex poisoned");
            let lengths = slots.iter().map(Vec::len).collect();
            let flat = slots.iter().flat_map(|v| v.iter().copied()).collect();
            (flat, lengths)
        };
        self.channels.exit.wait();
        (flat, lengths)
    }

    fn alltoall(&self, values: &[f64]) -> Vec<f64> {
        assert_eq!(values.len(), self.channels.size, "alltoall needs one scalar per rank");
        {
            let mut mailbox = self.channels.mailbox.lock().expect("cluster mutex poisoned");
            for (dest, &v) in values.iter().enumerate() {
                mailbox[self.rank][dest] = vec![v];
            }
        }
        self.channels.entry.wait();
        let result = {
            let mailbox = self.channels.mailbox.lock().expect("cluster mutex poisoned");
            (0..self.channels.size).map(|src| mailbox[src][self.rank][0]).collect()
        };
        self.channels.exit.wait();
        result
    }

    fn alltoallv(&self, values: &[Vec<f64>]) -> Vec<Vec<f64>> {
        assert_eq!(values.len(), self.channels.size, "alltoallv needs one vector per rank");
        {
            let mut mailbox = self.channels.mailbox.lock().expect("cluster mutex poisoned");
            for (dest, v) in values.iter().enumerate() {
                mailbox[self.rank][dest] = v.clone();
            }
        }
        self.channels.entry.wait();
        let result = {
            let mailbox = self.channels.mailbox.lock().expect("cluster mutex poisoned");
            (0..self.channels.size).map(|src| mailbox[src][self.rank].clone()).collect()
        };
        self.channels.exit.wait();
        result
    }

    fn allreduce(&self, value: f64, op: ReduceOp) -> f64 {
        let all = self.allgather_scalar(value);
        match op {
            ReduceOp::And => {
                if all.iter().all(|&v| v != 0.0) {
                    1.0
                } else {
                    0.0
                }
            }
            ReduceOp::Sum => all.iter().sum(),
            ReduceOp::Min => all.iter().cloned().fold(f64::INFINITY, f64::min),
        }
    }

    fn broadcast(&self, root: usize, value: Option<Vec<f64>>) -> Vec<f64> {
        if self.rank == root {
            let payload = value.expect("the broadcast root must supply a value");
            *self.channels.broadcast_slot.lock().expect("cluster mutex poisoned") = payload;
        }
        self.channels.entry.wait();
        let result = self.channels.broadcast_slot.lock().expect("cluster mutex poisoned").clone();
        self.channels.exit.wait();
        result
    }

    fn gather(&self, root: usize, value: f64) -> Option<Vec<f64>> {
        let all = self.allgather_scalar(value);
        if self.rank == root {
            Some(all)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allgather_sees_every_rank() {
        let results = ThreadedCollective::run(4, |c| c.allgather_scalar(c.rank() as f64));
        for r in results {
            assert_eq!(r, vec![0.0, 1.0, 2.0, 3.0]);
        }
    }

    #[test]
    fn alltoall_routes_by_destination() {
        let size = 3;
        let results = ThreadedCollective::run(size, |c| {
            let out: Vec<f64> = (0..size).map(|dest| (c.rank() * 10 + dest) as f64).collect();
            c.alltoall(&out)
        });
        for (dest, row) in results.iter().enumerate() {
            for (src, &v) in row.iter().enumerate() {
                assert_eq!(v, (src * 10 + dest) as f64);
            }
        }
    }

    #[test]
    fn allreduce_sum_matches_triangular_number() {
        let results = ThreadedCollective::run(5, |c| c.allreduce(c.rank() as f64, ReduceOp::Sum));
        for r in results {
            assert_eq!(r, 10.0);
        }
    }

    #[test]
    fn allreduce_and_is_false_unless_every_rank_is_nonzero() {
        let results = ThreadedCollective::run(3, |c| c.allreduce(if c.rank() == 1 { 0.0 } else { 1.0 }, ReduceOp::And));
        for r in &results {
            assert_eq!(*r, 0.0, "one rank reported zero, so AND across the group must be false");
        }

        let results = ThreadedCollective::run(3, |c| c.allreduce(c.rank() as f64 + 1.0, ReduceOp::And));
        for r in results {
            assert_eq!(r, 1.0, "every rank reported nonzero, so AND across the group must be true");
        }
    }

    #[test]
    fn allreduce_min_picks_the_smallest_rank_value() {
        let results = ThreadedCollective::run(4, |c| c.allreduce(10.0 - c.rank() as f64, ReduceOp::Min));
        for r in results {
            assert_eq!(r, 7.0);
        }
    }

    #[test]
    fn broadcast_delivers_root_value_everywhere() {
        let results = ThreadedCollective::run(4, |c| {
            let v = if c.rank() == 2 { Some(vec![42.0, 7.0]) } else { None };
            c.broadcast(2, v)
        });
        for r in results {
            assert_eq!(r, vec![42.0, 7.0]);
        }
    }
}
