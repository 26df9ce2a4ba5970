use std::io;

use thiserror::Error;

use crate::ThreadPool;

/// Errors that can occur when establishing or changing a pool's worker count.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResizeError {
    /// The requested worker count exceeds [`MAX_THREADS`][crate::MAX_THREADS].
    ///
    /// The pool is left untouched.
    #[error("requested {requested} worker threads but the pool supports at most {max}")]
    TooManyThreads {
        /// The worker count that was asked for.
        requested: usize,

        /// The hard maximum the pool enforces.
        max: usize,
    },

    /// The operating system refused to start one of the new worker threads.
    ///
    /// This is not fatal: the pool keeps the workers that did start and remains
    /// fully usable at the reported size.
    #[error("only {started} of {requested} worker threads could be started")]
    Spawn {
        /// How many workers are alive after the partial growth.
        started: usize,

        /// The worker count that was asked for.
        requested: usize,

        /// The underlying spawn failure.
        #[source]
        source: io::Error,
    },
}

/// The pool could not be shut down because task queues are still attached to it.
///
/// Queues must be dropped before the pool they are registered with can shut
/// down. The error hands the untouched pool back via [`into_pool()`][Self::into_pool]
/// so the caller can detach the remaining queues and retry.
///
/// # Example
///
/// ```rust
/// use new_zealand::nz;
/// use queue_pool::{TaskQueue, ThreadPool};
///
/// let pool = ThreadPool::builder().thread_count(0).build().unwrap();
/// let queue = TaskQueue::new(&pool, nz!(8), None);
///
/// let error = pool.shutdown().unwrap_err();
/// assert_eq!(error.queue_count(), 1);
///
/// let pool = error.into_pool();
/// drop(queue);
/// pool.shutdown().unwrap();
/// ```
#[derive(Debug, Error)]
#[error("{queue_count} task queue(s) are still attached to the thread pool")]
pub struct ShutdownError {
    pool: ThreadPool,
    queue_count: usize,
}

impl ShutdownError {
    pub(crate) fn new(pool: ThreadPool, queue_count: usize) -> Self {
        Self { pool, queue_count }
    }

    /// How many task queues were still attached when shutdown was attempted.
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.queue_count
    }

    /// Recovers the pool so the caller can detach the remaining queues and retry.
    #[must_use]
    pub fn into_pool(self) -> ThreadPool {
        self.pool
    }
}
