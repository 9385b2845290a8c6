//! Host task scheduling.
//!
//! Workers of a private rayon pool pull task indices from a shared counter,
//! each with its own [`HostScratch`]. Contributions to shared outputs go
//! through [`AtomicBuffer`], so any task may run on any worker in any order.

use crate::error::{Result, XcError};
use crate::local_work_driver::HostScratch;
use crate::task::XcTask;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Order in which the local tasks are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOrder {
    /// Most expensive first, ties in the order given.
    #[default]
    CostDescending,
    Given,
}

/// Shared `f64` accumulator with lock-free element updates.
#[derive(Debug)]
pub struct AtomicBuffer {
    data: Vec<AtomicU64>,
}

impl AtomicBuffer {
    pub fn zeros(len: usize) -> Self {
        Self {
            data: (0..len).map(|_| AtomicU64::new(0.0_f64.to_bits())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn add(&self, idx: usize, val: f64) {
        if val == 0.0 {
            return;
        }
        // the update closure never declines, so this cannot fail
        let _ = self.data[idx].fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            Some((f64::from_bits(bits) + val).to_bits())
        });
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.data
            .iter()
            .map(|v| f64::from_bits(v.load(Ordering::Relaxed)))
            .collect()
    }
}

pub struct Scheduler {
    pool: rayon::ThreadPool,
    order: TaskOrder,
}

impl Scheduler {
    /// `None` uses one worker per available core.
    pub fn new(num_threads: Option<usize>, order: TaskOrder) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = num_threads {
            if n == 0 {
                return Err(XcError::InvalidInput("number of threads must be positive".to_string()));
            }
            builder = builder.num_threads(n);
        }
        let pool = builder
            .thread_name(|i| format!("xc-worker-{}", i))
            .build()
            .map_err(|e| XcError::InvalidInput(format!("cannot build thread pool: {}", e)))?;
        Ok(Self { pool, order })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn order(&self) -> TaskOrder {
        self.order
    }

    pub fn execution_order(&self, tasks: &[XcTask]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..tasks.len()).collect();
        if self.order == TaskOrder::CostDescending {
            order.sort_by_key(|&i| std::cmp::Reverse(tasks[i].cost()));
        }
        order
    }

    /// Run `kernel` once per task. The first error stops the remaining
    /// workers from starting new tasks and is returned.
    pub fn run<F>(&self, tasks: &[XcTask], kernel: F) -> Result<()>
    where
        F: Fn(&XcTask, &mut HostScratch) -> Result<()> + Sync,
    {
        let order = self.execution_order(tasks);
        let next = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let first_error: Mutex<Option<XcError>> = Mutex::new(None);
        let nworkers = self.num_threads().min(order.len()).max(1);
        debug!("running {} tasks on {} workers", order.len(), nworkers);

        self.pool.scope(|s| {
            for _ in 0..nworkers {
                s.spawn(|_| {
                    let mut scratch = HostScratch::new();
                    while !abort.load(Ordering::Relaxed) {
                        let k = next.fetch_add(1, Ordering::Relaxed);
                        let Some(&idx) = order.get(k) else {
                            break;
                        };
                        if let Err(e) = kernel(&tasks[idx], &mut scratch) {
                            abort.store(true, Ordering::Relaxed);
                            if let Ok(mut slot) = first_error.lock() {
                                slot.get_or_insert(e);
                            }
                            break;
                        }
                    }
                });
            }
        });

        match first_error.into_inner() {
            Ok(None) => Ok(()),
            Ok(Some(e)) => Err(e),
            Err(_) => Err(XcError::InvalidInput("worker error slot poisoned".to_string())),
        }
    }
}
