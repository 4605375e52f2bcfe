//! Explicit communication contexts.
//!
//! Workers cooperate through a [`Communicator`], which is always passed explicitly (usually as
//! part of a [`DomainDecomposition`](crate::decomposition::DomainDecomposition)) and never
//! stored in global state. The only primitive an implementation needs to provide is a
//! collective, synchronous point-to-point [`exchange`](Communicator::exchange). Gathers and
//! reductions are built on top of it.
//!
//! Two implementations are provided: [`SelfCommunicator`] for a single worker, and
//! [`ThreadCommunicator`], which runs a group of workers on threads of the current process.
use crate::error::FeecError;
use log::trace;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::{Arc, Barrier};

/// A message sent to, or received from, another worker.
///
/// For outgoing messages `peer` is the destination rank, for incoming messages it is the
/// source rank.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub peer: usize,
    pub tag: u32,
    pub data: Vec<f64>,
}

/// A group of cooperating workers.
///
/// All methods are collective: every worker of the group must call them in the same order,
/// otherwise the group deadlocks. A failed collective is fatal, there is no retry.
pub trait Communicator: Debug + Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Delivers every outgoing message to its destination and returns the messages sent to
    /// this worker, ordered by source rank and tag.
    fn exchange(&self, outgoing: Vec<Message>) -> Result<Vec<Message>, FeecError>;

    /// Gathers `data` from every member of `group`, in the order given by `group`.
    ///
    /// Every worker calls this simultaneously with its own group; groups of different workers
    /// may differ, but a worker must be a member of its own group.
    fn all_gather(&self, group: &[usize], tag: u32, data: Vec<f64>) -> Result<Vec<Vec<f64>>, FeecError> {
        let outgoing = group
            .iter()
            .map(|&peer| Message {
                peer,
                tag,
                data: data.clone(),
            })
            .collect();
        let mut incoming = self.exchange(outgoing)?;
        group
            .iter()
            .map(|&peer| {
                incoming
                    .iter()
                    .position(|message| message.peer == peer && message.tag == tag)
                    .map(|idx| incoming.swap_remove(idx).data)
                    .ok_or_else(|| FeecError::Communication(format!("missing contribution from rank {peer}")))
            })
            .collect()
    }

    /// Sums `value` over all workers. Contributions are added in rank order.
    fn all_reduce_sum(&self, value: f64) -> Result<f64, FeecError> {
        let everyone: Vec<usize> = (0..self.size()).collect();
        let values = self.all_gather(&everyone, REDUCTION_TAG, vec![value])?;
        Ok(values.iter().map(|v| v[0]).sum())
    }

    /// Maximum of `value` over all workers.
    fn all_reduce_max(&self, value: f64) -> Result<f64, FeecError> {
        let everyone: Vec<usize> = (0..self.size()).collect();
        let values = self.all_gather(&everyone, REDUCTION_TAG, vec![value])?;
        Ok(values.iter().map(|v| v[0]).fold(f64::NEG_INFINITY, f64::max))
    }
}

const REDUCTION_TAG: u32 = 1;

/// The trivial communicator of a single worker.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SelfCommunicator;

impl Communicator for SelfCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange(&self, outgoing: Vec<Message>) -> Result<Vec<Message>, FeecError> {
        if let Some(message) = outgoing.iter().find(|message| message.peer != 0) {
            return Err(FeecError::Communication(format!(
                "rank {} does not exist in a single-worker group",
                message.peer
            )));
        }
        let mut incoming = outgoing;
        incoming.sort_by_key(|message| message.tag);
        Ok(incoming)
    }
}

#[derive(Debug)]
struct Mailboxes {
    inboxes: Vec<Mutex<Vec<Message>>>,
    barrier: Barrier,
}

/// A group of workers running on threads of the same process.
///
/// Each worker owns one `ThreadCommunicator`. Messages are delivered through shared inboxes,
/// and every exchange is bracketed by two barriers, so inboxes are never written for the next
/// exchange before all workers have drained them.
#[derive(Debug, Clone)]
pub struct ThreadCommunicator {
    rank: usize,
    mailboxes: Arc<Mailboxes>,
}

impl ThreadCommunicator {
    /// Creates the communicators of a group of `size` workers, ordered by rank.
    pub fn group(size: usize) -> Vec<Self> {
        let mailboxes = Arc::new(Mailboxes {
            inboxes: (0..size).map(|_| Mutex::new(Vec::new())).collect(),
            barrier: Barrier::new(size),
        });
        (0..size)
            .map(|rank| Self {
                rank,
                mailboxes: Arc::clone(&mailboxes),
            })
            .collect()
    }

    /// Runs `worker` on `size` scoped threads, one per rank, and returns the results in rank
    /// order.
    ///
    /// # Panics
    ///
    /// Propagates the panic of any worker. Note that a worker panicking in between collectives
    /// leaves the remaining workers waiting, so workers should return their results rather
    /// than assert on them.
    pub fn run<R, F>(size: usize, worker: F) -> Vec<R>
    where
        R: Send,
        F: Fn(Arc<dyn Communicator>) -> R + Sync,
    {
        std::thread::scope(|scope| {
            let handles: Vec<_> = Self::group(size)
                .into_iter()
                .map(|comm| {
                    let worker = &worker;
                    scope.spawn(move || worker(Arc::new(comm)))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.mailboxes.inboxes.len()
    }

    fn exchange(&self, outgoing: Vec<Message>) -> Result<Vec<Message>, FeecError> {
        let size = self.size();
        let mut invalid_peer = None;
        let num_outgoing = outgoing.len();
        for message in outgoing {
            if message.peer >= size {
                invalid_peer = Some(message.peer);
                continue;
            }
            self.mailboxes.inboxes[message.peer].lock().push(Message {
                peer: self.rank,
                tag: message.tag,
                data: message.data,
            });
        }

        // Every worker must take part in both barriers, even if its own messages were invalid
        self.mailboxes.barrier.wait();
        let mut incoming = std::mem::take(&mut *self.mailboxes.inboxes[self.rank].lock());
        self.mailboxes.barrier.wait();

        if let Some(peer) = invalid_peer {
            return Err(FeecError::Communication(format!(
                "rank {peer} does not exist in a group of {size} workers"
            )));
        }
        trace!(
            "rank {} sent {} and received {} messages",
            self.rank,
            num_outgoing,
            incoming.len()
        );
        incoming.sort_by_key(|message| (message.peer, message.tag));
        Ok(incoming)
    }
}
