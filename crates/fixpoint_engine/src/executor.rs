//! Worker pool for per-round delta computation.

use std::fmt;

use fixpoint_foundation::{Error, Result};
use fixpoint_storage::SessionMemory;
use rayon::prelude::*;

use crate::node::EndNode;

/// Runs end node delta computations on a dedicated thread pool.
///
/// Every task reads working memory through a shared reference and writes
/// only its own node, so tasks need no locking. [`compute_deltas`] returns
/// once all of them have finished.
///
/// [`compute_deltas`]: Self::compute_deltas
pub struct TaskExecutor {
    pool: rayon::ThreadPool,
}

impl TaskExecutor {
    /// Starts a pool of `parallelism` threads; 0 picks one per available core.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the threads cannot be spawned.
    pub fn new(parallelism: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .thread_name(|i| format!("fixpoint-delta-{i}"))
            .build()
            .map_err(|e| Error::internal(format!("cannot start delta workers: {e}")))?;
        Ok(Self { pool })
    }

    /// Returns the number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Computes the deltas of `nodes` in parallel.
    ///
    /// # Errors
    ///
    /// Returns a condition failure from one of the nodes. The other nodes
    /// may or may not have finished.
    pub fn compute_deltas(&self, mut nodes: Vec<&mut EndNode>, memory: &SessionMemory) -> Result<()> {
        match nodes.len() {
            0 => Ok(()),
            1 => nodes[0].compute_delta(memory),
            _ => self.pool.install(|| {
                nodes
                    .par_iter_mut()
                    .try_for_each(|node| node.compute_delta(memory))
            }),
        }
    }
}

impl fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("threads", &self.threads())
            .finish()
    }
}
