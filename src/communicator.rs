//! # Distributed-execution contract
//!
//! The map-making core is agnostic of the distributed runtime that partitions the
//! time-ordered data. Everything it needs from that runtime is captured by the
//! [`Communicator`] trait: a rank/size query and an in-place global sum-reduction.
//!
//! ## Reduction semantics
//!
//! `reduce_sum_*` is a **collective** call: every member of the group must call it, in the
//! same order, with a buffer of the same length. On return, every member holds the same
//! reduced buffer. Contributions are combined in **ascending rank order** — the reduction
//! order is part of the contract, so that repeated runs with the same process count produce
//! bit-identical results (see the solver's reproducibility requirements).
//!
//! Two implementations ship with the crate:
//!
//! * [`SelfComm`] — the single-process group; reductions are no-ops. This is the right
//!   communicator for serial map-making and for most unit tests.
//! * [`ThreadComm`] — a fixed-size in-process group built over shared state. Each member is
//!   owned by one thread; the group exercises true multi-shard semantics without an MPI
//!   runtime. The integration tests use it to check partition invariance across 1, 2, and
//!   4 shards.
//!
//! An MPI-backed implementation is a thin adapter over `MPI_Allreduce` and is left to the
//! embedding experiment framework.

use std::ops::AddAssign;
use std::sync::{Arc, Condvar, Mutex};

/// Rank/size query and global sum-reduction over a fixed process group.
///
/// Mismatched buffer lengths across a reduction are a programming error on the caller's
/// side and panic on every participant rather than hang.
pub trait Communicator: Send + Sync {
    /// Rank of the calling process within the group, in `0..size`.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// In-place global sum of `buf` across all group members, combined in ascending rank
    /// order. On return every member holds the identical reduced buffer.
    fn reduce_sum_f64(&self, buf: &mut [f64]);

    /// Same as [`Communicator::reduce_sum_f64`], for unsigned counters (hit counts).
    fn reduce_sum_u64(&self, buf: &mut [u64]);
}

/// The trivial single-process group.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn reduce_sum_f64(&self, _buf: &mut [f64]) {}

    fn reduce_sum_u64(&self, _buf: &mut [u64]) {}
}

// -------------------------------------------------------------------------------------------------
// In-process thread group
// -------------------------------------------------------------------------------------------------

struct Round<T> {
    arrived: usize,
    departed: usize,
    slots: Vec<Option<Vec<T>>>,
    result: Option<Vec<T>>,
}

impl<T> Round<T> {
    fn new(size: usize) -> Self {
        Round {
            arrived: 0,
            departed: 0,
            slots: (0..size).map(|_| None).collect(),
            result: None,
        }
    }
}

struct Channel<T> {
    state: Mutex<Round<T>>,
    cv: Condvar,
}

impl<T: Copy + Default + AddAssign> Channel<T> {
    fn new(size: usize) -> Self {
        Channel {
            state: Mutex::new(Round::new(size)),
            cv: Condvar::new(),
        }
    }

    /// One barrier-synchronized reduction round. Deposits `buf`, waits for the whole
    /// group, then copies the ascending-rank sum back into `buf`.
    fn reduce(&self, size: usize, rank: usize, buf: &mut [T]) {
        let mut state = self.state.lock().unwrap();

        // A member that finished the previous round may re-enter before the group has
        // fully drained it; hold it at the door until the round is reset.
        while state.result.is_some() || state.slots[rank].is_some() {
            state = self.cv.wait(state).unwrap();
        }

        if let Some(first) = state.slots.iter().flatten().next() {
            assert_eq!(
                first.len(),
                buf.len(),
                "mismatched reduction buffer length across the group"
            );
        }

        state.slots[rank] = Some(buf.to_vec());
        state.arrived += 1;

        if state.arrived == size {
            // Last member in: combine in ascending rank order.
            let mut acc = vec![T::default(); buf.len()];
            for slot in state.slots.iter_mut() {
                let contribution = slot.take().expect("every member has deposited");
                for (a, c) in acc.iter_mut().zip(contribution.iter()) {
                    *a += *c;
                }
            }
            state.result = Some(acc);
            self.cv.notify_all();
        } else {
            while state.result.is_none() {
                state = self.cv.wait(state).unwrap();
            }
        }

        buf.copy_from_slice(state.result.as_ref().unwrap());
        state.departed += 1;

        if state.departed == size {
            state.arrived = 0;
            state.departed = 0;
            state.result = None;
            self.cv.notify_all();
        }
    }
}

struct ThreadGroup {
    size: usize,
    f64_channel: Channel<f64>,
    u64_channel: Channel<u64>,
}

/// One member of a fixed-size in-process communicator group.
///
/// Build the whole group at once with [`ThreadComm::group`] and hand one member to each
/// worker thread. Every member must take part in every collective call.
pub struct ThreadComm {
    rank: usize,
    shared: Arc<ThreadGroup>,
}

impl ThreadComm {
    /// Create a group of `size` connected members.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "communicator group must not be empty");
        let shared = Arc::new(ThreadGroup {
            size,
            f64_channel: Channel::new(size),
            u64_channel: Channel::new(size),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn reduce_sum_f64(&self, buf: &mut [f64]) {
        self.shared
            .f64_channel
            .reduce(self.shared.size, self.rank, buf);
    }

    fn reduce_sum_u64(&self, buf: &mut [u64]) {
        self.shared
            .u64_channel
            .reduce(self.shared.size, self.rank, buf);
    }
}
