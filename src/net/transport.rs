//! Raw byte fabrics.
//!
//! A [`Fabric`] moves opaque byte chunks between ranks and provides the
//! all-ranks barrier that phase bumps hang off. Framing, tagging and
//! buffering live one layer up in [`BufferedNet`](crate::net::BufferedNet).
//!
//! [`LocalFabric`] is the in-process backend: one mailbox per rank shared
//! through an `Arc`, used by multi-rank tests and single-node runs. The MPI
//! backend lives in [`mpi`](crate::net::mpi) behind the `mpi-support`
//! feature.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Byte-chunk transport between `size()` ranks.
pub trait Fabric: Send + Sync {
    /// Rank of this process in `[0, size)`.
    fn rank(&self) -> usize;
    /// Total number of ranks.
    fn size(&self) -> usize;
    /// Hand a chunk to the fabric for delivery to `dest`. Never blocks on
    /// the receiver.
    fn enqueue(&self, dest: usize, bytes: Vec<u8>);
    /// Next delivered chunk for this rank, if any.
    fn dequeue(&self) -> Option<(usize, Vec<u8>)>;
    /// Block until every rank has arrived.
    fn barrier(&self);
}

struct Mailboxes {
    inboxes: Vec<Mutex<VecDeque<(usize, Vec<u8>)>>>,
    barrier: EpochBarrier,
}

/// In-process fabric: ranks are threads sharing a set of mailboxes.
#[derive(Clone)]
pub struct LocalFabric {
    rank: usize,
    shared: Arc<Mailboxes>,
}

impl LocalFabric {
    /// Create `size` connected endpoints, one per rank.
    pub fn cluster(size: usize) -> Vec<LocalFabric> {
        assert!(size > 0, "a fabric needs at least one rank");
        let shared = Arc::new(Mailboxes {
            inboxes: (0..size).map(|_| Mutex::new(VecDeque::new())).collect(),
            barrier: EpochBarrier::new(size),
        });
        (0..size)
            .map(|rank| LocalFabric {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Fabric for LocalFabric {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.inboxes.len()
    }

    fn enqueue(&self, dest: usize, bytes: Vec<u8>) {
        self.shared.inboxes[dest].lock().push_back((self.rank, bytes));
    }

    fn dequeue(&self) -> Option<(usize, Vec<u8>)> {
        self.shared.inboxes[self.rank].lock().pop_front()
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }
}

/// Reusable all-ranks barrier keyed by an epoch count.
pub(crate) struct EpochBarrier {
    size: usize,
    state: Mutex<(usize, u64)>,
    cv: Condvar,
}

impl EpochBarrier {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new((0, 0)),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn wait(&self) {
        let mut guard = self.state.lock();
        let epoch = guard.1;
        guard.0 += 1;
        if guard.0 == self.size {
            guard.0 = 0;
            guard.1 += 1;
            self.cv.notify_all();
        } else {
            while guard.1 == epoch {
                self.cv.wait(&mut guard);
            }
        }
    }
}
