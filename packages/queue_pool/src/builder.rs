use std::fmt;
use std::sync::Arc;

use crate::pool::WorkerHook;
use crate::{ResizeError, ThreadPool};

/// Configures and creates a [`ThreadPool`].
///
/// Obtained via [`ThreadPool::builder()`]. Every setting has a default, so
/// `ThreadPool::builder().build()` is equivalent to [`ThreadPool::new()`].
///
/// # Example
///
/// ```rust
/// use queue_pool::ThreadPool;
///
/// let pool = ThreadPool::builder()
///     .thread_count(2)
///     .stack_size(512 * 1024)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.thread_count(), 2);
/// ```
#[must_use]
pub struct ThreadPoolBuilder {
    thread_count: Option<usize>,
    stack_size: Option<usize>,
    worker_start: Option<WorkerHook>,
    worker_stop: Option<WorkerHook>,
}

impl ThreadPoolBuilder {
    pub(crate) fn new() -> Self {
        Self {
            thread_count: None,
            stack_size: None,
            worker_start: None,
            worker_stop: None,
        }
    }

    /// Sets the initial number of worker threads.
    ///
    /// Zero is valid; a pool without workers leaves all execution to
    /// submitters and waiters. Defaults to
    /// [`ThreadPool::default_thread_count()`].
    pub fn thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = Some(thread_count);
        self
    }

    /// Sets the stack size of worker threads, in bytes.
    ///
    /// Defaults to the platform's standard thread stack size.
    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Registers a function invoked on each worker thread as it starts,
    /// before it processes any task. Receives the worker's index.
    ///
    /// Useful for per-thread setup such as priority or affinity.
    pub fn on_worker_start<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.worker_start = Some(Arc::new(f));
        self
    }

    /// Registers a function invoked on each worker thread just before it
    /// exits. Receives the worker's index.
    pub fn on_worker_stop<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.worker_stop = Some(Arc::new(f));
        self
    }

    /// Creates the pool and spawns its initial worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`ResizeError`] if the configured thread count exceeds
    /// [`MAX_THREADS`][crate::MAX_THREADS] or the threads cannot be spawned.
    pub fn build(self) -> Result<ThreadPool, ResizeError> {
        let thread_count = self
            .thread_count
            .unwrap_or_else(ThreadPool::default_thread_count);

        ThreadPool::create(
            thread_count,
            self.stack_size,
            self.worker_start,
            self.worker_stop,
        )
    }
}

impl fmt::Debug for ThreadPoolBuilder {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolBuilder")
            .field("thread_count", &self.thread_count)
            .field("stack_size", &self.stack_size)
            .field("worker_start", &self.worker_start.as_ref().map(|_| ".."))
            .field("worker_stop", &self.worker_stop.as_ref().map(|_| ".."))
            .finish()
    }
}
