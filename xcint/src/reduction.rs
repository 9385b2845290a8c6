//! Cross-process summation of partial integrals.
//!
//! A rank is identified through [`ProcessGroup`]; the sum is performed by a
//! [`ReductionDriver`]. [`SerialGroup`] is the single-process case and
//! [`ThreadGroup`] runs ranks as threads of one process, which is what the
//! command line and the distributed tests use.

use crate::error::{Result, XcError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex, PoisonError};
use tracing::debug;

/// The set of cooperating processes.
pub trait ProcessGroup: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionOp {
    Sum,
}

pub trait ReductionDriver: Send + Sync {
    /// Whether buffers living in host memory can be reduced in place.
    fn takes_host_memory(&self) -> bool;

    fn allreduce_inplace(&self, buf: &mut [f64], op: ReductionOp) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SerialGroup;

impl ProcessGroup for SerialGroup {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

impl ReductionDriver for SerialGroup {
    fn takes_host_memory(&self) -> bool {
        true
    }

    fn allreduce_inplace(&self, _buf: &mut [f64], _op: ReductionOp) -> Result<()> {
        Ok(())
    }
}

fn poisoned<T>(_: PoisonError<T>) -> XcError {
    XcError::Reduction("shared sum buffer poisoned".to_string())
}

struct SharedSum {
    barrier: Barrier,
    sum: Mutex<Vec<f64>>,
    failed: AtomicBool,
}

/// One rank of a group of threads reducing through shared memory.
///
/// `allreduce_inplace` is collective: every rank must call it the same number
/// of times, including ranks whose own work has failed, or the others block
/// forever. A rank that returns early must still join the reduction with a
/// buffer of the agreed length. Once inside, a rank always passes every
/// barrier; a mismatched length or a poisoned buffer makes the call fail on
/// all ranks.
#[derive(Clone)]
pub struct ThreadGroup {
    rank: usize,
    size: usize,
    shared: Arc<SharedSum>,
}

impl ThreadGroup {
    /// Handles for ranks `0..size`, one per participating thread.
    pub fn create(size: usize) -> Vec<ThreadGroup> {
        let shared = Arc::new(SharedSum {
            barrier: Barrier::new(size),
            sum: Mutex::new(Vec::new()),
            failed: AtomicBool::new(false),
        });
        (0..size)
            .map(|rank| ThreadGroup {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl ProcessGroup for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

impl ReductionDriver for ThreadGroup {
    fn takes_host_memory(&self) -> bool {
        true
    }

    fn allreduce_inplace(&self, buf: &mut [f64], op: ReductionOp) -> Result<()> {
        let ReductionOp::Sum = op;
        let shared = &self.shared;
        let mut result = Ok(());

        // previous reduction fully consumed before the leader resets
        if shared.barrier.wait().is_leader() {
            shared.failed.store(false, Ordering::SeqCst);
            match shared.sum.lock() {
                Ok(mut sum) => {
                    sum.clear();
                    sum.resize(buf.len(), 0.0);
                }
                Err(e) => result = Err(poisoned(e)),
            }
        }
        shared.barrier.wait();

        if result.is_ok() {
            match shared.sum.lock() {
                Ok(mut sum) if sum.len() == buf.len() => {
                    sum.iter_mut().zip(buf.iter()).for_each(|(s, b)| *s += b);
                }
                Ok(sum) => {
                    result = Err(XcError::Reduction(format!(
                        "rank {} contributed {} values, expected {}",
                        self.rank,
                        buf.len(),
                        sum.len()
                    )));
                }
                Err(e) => result = Err(poisoned(e)),
            }
        }
        if result.is_err() {
            shared.failed.store(true, Ordering::SeqCst);
        }
        shared.barrier.wait();

        if result.is_ok() {
            if shared.failed.load(Ordering::SeqCst) {
                result = Err(XcError::Reduction(format!(
                    "rank {}: another rank failed the reduction",
                    self.rank
                )));
            } else {
                match shared.sum.lock() {
                    Ok(sum) => buf.copy_from_slice(&sum),
                    Err(e) => result = Err(poisoned(e)),
                }
            }
        }
        debug!("rank {} reduced {} values", self.rank, buf.len());
        result
    }
}
