use std::fmt;
use std::mem;
use std::num::NonZero;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::constants::{ERR_POISONED_LOCK, MAX_THREADS};
use crate::queue::QueueCore;
use crate::worker;
use crate::{ResizeError, ShutdownError, ThreadPoolBuilder};

/// A hook invoked on a worker thread as it starts or stops, receiving the
/// worker's index.
pub(crate) type WorkerHook = Arc<dyn Fn(usize) + Send + Sync>;

/// A resizable set of worker threads that cooperatively drains any number of
/// independently created [`TaskQueue`][crate::TaskQueue]s.
///
/// Queues are serviced round-robin so a busy queue cannot starve the others,
/// and each queue may cap how many of its tasks run concurrently across the
/// whole pool.
///
/// The worker count can be changed at any time with
/// [`set_thread_count()`][Self::set_thread_count]; shrinking never interrupts a
/// task that is already running.
///
/// # Shutdown
///
/// [`shutdown()`][Self::shutdown] is the checked teardown path: it refuses to
/// proceed while task queues are still attached, handing the pool back so the
/// caller can detach them first. Merely dropping the pool stops and joins the
/// workers unconditionally; that is always memory-safe because queues co-own
/// the pool's shared state, and any tasks left behind are executed by the
/// thread that eventually drains or drops their queue.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use new_zealand::nz;
/// use queue_pool::{Task, TaskQueue, ThreadPool};
///
/// let pool = ThreadPool::builder().thread_count(2).build().unwrap();
/// let queue = TaskQueue::new(&pool, nz!(64), None);
///
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// queue.submit((0..10).map(|_| {
///     let counter = Arc::clone(&counter);
///     Task::new(move || {
///         counter.fetch_add(1, Ordering::Relaxed);
///     })
/// }));
///
/// queue.wait_for_tasks();
/// assert_eq!(counter.load(Ordering::Relaxed), 10);
///
/// drop(queue);
/// pool.shutdown().unwrap();
/// ```
#[derive(Debug)]
pub struct ThreadPool {
    pub(crate) core: Arc<PoolCore>,
}

/// Shared pool state reachable from the pool handle, every worker thread and
/// every attached queue. The queues keep it alive past the pool handle itself.
pub(crate) struct PoolCore {
    pub(crate) state: Mutex<PoolState>,

    /// Signaled whenever there may be new work or the pool configuration
    /// changed; workers sleep on this.
    pub(crate) work_signal: Condvar,

    /// Rendezvous for `set_thread_count`: signaled by workers as they start or
    /// stop so a resize can block until the pool is stable again.
    pub(crate) resize_signal: Condvar,

    pub(crate) stack_size: Option<usize>,
    pub(crate) worker_start: Option<WorkerHook>,
    pub(crate) worker_stop: Option<WorkerHook>,
}

/// Everything guarded by the pool's state mutex: the queue array, the worker
/// array, the round-robin cursor and the lifecycle flags.
pub(crate) struct PoolState {
    pub(crate) queues: Vec<Arc<QueueCore>>,

    /// Index of the queue the next scan starts from. Always within
    /// `[0, queues.len())` while any queue is registered.
    pub(crate) next_queue: usize,

    /// Join handles of spawned workers; the handle at position `i` belongs to
    /// the worker that captured index `i`. Shrinking always removes from the
    /// top, so indices of surviving workers never move.
    pub(crate) workers: Vec<thread::JoinHandle<()>>,

    /// The live worker count. A worker whose index is at or above this value
    /// has been removed by a shrink and must exit.
    pub(crate) thread_count: usize,

    /// How many workers are still expected to signal a start or stop for the
    /// resize currently in progress.
    pub(crate) pending_workers: usize,

    /// Set once at shutdown; workers exit as soon as they observe it.
    pub(crate) stop: bool,
}

impl ThreadPool {
    /// Creates a pool with the default configuration:
    /// [`default_thread_count()`][Self::default_thread_count] workers with the
    /// platform's default stack size.
    ///
    /// # Errors
    ///
    /// Returns [`ResizeError::Spawn`] if the operating system refuses to start
    /// one of the workers.
    pub fn new() -> Result<Self, ResizeError> {
        Self::builder().build()
    }

    /// Starts building a pool with a custom configuration.
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
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::new()
    }

    pub(crate) fn create(
        thread_count: usize,
        stack_size: Option<usize>,
        worker_start: Option<WorkerHook>,
        worker_stop: Option<WorkerHook>,
    ) -> Result<Self, ResizeError> {
        let pool = Self {
            core: Arc::new(PoolCore {
                state: Mutex::new(PoolState {
                    queues: Vec::new(),
                    next_queue: 0,
                    workers: Vec::new(),
                    thread_count: 0,
                    pending_workers: 0,
                    stop: false,
                }),
                work_signal: Condvar::new(),
                resize_signal: Condvar::new(),
                stack_size,
                worker_start,
                worker_stop,
            }),
        };

        pool.set_thread_count(thread_count)?;
        Ok(pool)
    }

    /// The worker count a pool uses when none is configured explicitly: the
    /// logical core count minus one (leaving a core for the submitting
    /// thread), clamped to `[1, MAX_THREADS]`.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Depends on the host's core count, so mutations are not reliably detectable.
    pub fn default_thread_count() -> usize {
        let cores = thread::available_parallelism().map_or(1, NonZero::get);
        if cores <= 1 {
            1
        } else {
            (cores - 1).min(MAX_THREADS)
        }
    }

    /// The number of live worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.core.state.lock().expect(ERR_POISONED_LOCK).thread_count
    }

    /// Grows or shrinks the worker set to exactly `thread_count` threads.
    ///
    /// Shrinking wakes the removed workers, waits for each to acknowledge and
    /// joins them; a worker mid-task finishes that task first. Growing spawns
    /// the new workers and waits until every one of them is running. Either
    /// way, concurrent resizes are serialized: a call that arrives while
    /// another resize is still settling blocks until the pool is stable.
    ///
    /// # Errors
    ///
    /// Returns [`ResizeError::TooManyThreads`] if `thread_count` exceeds
    /// [`MAX_THREADS`], leaving the pool untouched. Returns
    /// [`ResizeError::Spawn`] if growth failed partway; the workers that did
    /// start remain alive and [`thread_count()`][Self::thread_count] reflects
    /// the actual count.
    ///
    /// # Example
    ///
    /// ```rust
    /// use queue_pool::ThreadPool;
    ///
    /// let pool = ThreadPool::builder().thread_count(0).build().unwrap();
    ///
    /// pool.set_thread_count(4).unwrap();
    /// assert_eq!(pool.thread_count(), 4);
    ///
    /// pool.set_thread_count(1).unwrap();
    /// assert_eq!(pool.thread_count(), 1);
    /// ```
    pub fn set_thread_count(&self, thread_count: usize) -> Result<(), ResizeError> {
        if thread_count > MAX_THREADS {
            return Err(ResizeError::TooManyThreads {
                requested: thread_count,
                max: MAX_THREADS,
            });
        }

        let core = &self.core;
        let mut state = core.state.lock().expect(ERR_POISONED_LOCK);

        // Another resize may still be waiting for workers to start or stop;
        // let it settle before touching the worker set.
        while state.pending_workers > 0 {
            state = core.resize_signal.wait(state).expect(ERR_POISONED_LOCK);
        }

        let mut removed = Vec::new();
        let mut result = Ok(());

        if thread_count < state.thread_count {
            // Move the handles out so joining does not depend on pool state.
            removed = state.workers.split_off(thread_count);
            state.thread_count = thread_count;
            state.pending_workers = removed.len();

            // Wake everyone: workers past the new count must notice and exit,
            // and queues with limited concurrency get their next tasks picked
            // up by workers that are staying.
            core.work_signal.notify_all();
        } else if thread_count > state.thread_count {
            let first_new = state.thread_count;
            let new_workers = thread_count - first_new;
            state.pending_workers = new_workers;
            state.thread_count = thread_count;
            state.workers.reserve(new_workers);

            for index in first_new..thread_count {
                match worker::spawn(core, index) {
                    Ok(handle) => state.workers.push(handle),
                    Err(source) => {
                        // Keep the workers that did start; the pool stays
                        // usable at the reduced size. Workers that never
                        // spawned will not signal, so take them out of the
                        // rendezvous up front.
                        state.thread_count = index;
                        state.pending_workers -= thread_count - index;
                        result = Err(ResizeError::Spawn {
                            started: index,
                            requested: thread_count,
                            source,
                        });
                        break;
                    }
                }
            }
        }

        // Rendezvous: every new worker signals its start and every removed
        // worker signals its exit before we consider the resize complete.
        while state.pending_workers > 0 {
            state = core.resize_signal.wait(state).expect(ERR_POISONED_LOCK);
        }
        drop(state);

        // Join outside the lock; an exiting worker may still need the state
        // mutex on its way out.
        for handle in removed {
            if handle.join().is_err() {
                // Workers only panic on a poisoned pool lock; nothing is left
                // to settle for this one.
            }
        }

        result
    }

    /// Shuts the pool down: signals every worker to stop, joins them and
    /// consumes the pool.
    ///
    /// # Errors
    ///
    /// Fails with [`ShutdownError`] while any [`TaskQueue`][crate::TaskQueue]
    /// is still attached, leaving the pool fully untouched. The error returns
    /// the pool via [`ShutdownError::into_pool()`] so the caller can drop the
    /// queues and retry.
    pub fn shutdown(self) -> Result<(), ShutdownError> {
        let workers = {
            let mut state = self.core.state.lock().expect(ERR_POISONED_LOCK);

            if !state.queues.is_empty() {
                let queue_count = state.queues.len();
                drop(state);
                return Err(ShutdownError::new(self, queue_count));
            }

            state.stop = true;
            state.thread_count = 0;
            self.core.work_signal.notify_all();
            mem::take(&mut state.workers)
        };

        for handle in workers {
            if handle.join().is_err() {
                // Workers only panic on a poisoned pool lock.
            }
        }

        Ok(())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let workers = {
            let mut state = self.core.state.lock().expect(ERR_POISONED_LOCK);
            state.stop = true;
            state.thread_count = 0;
            self.core.work_signal.notify_all();
            mem::take(&mut state.workers)
        };

        for handle in workers {
            if handle.join().is_err() {
                // Workers only panic on a poisoned pool lock.
            }
        }
    }
}

impl PoolCore {
    pub(crate) fn register_queue(&self, queue: Arc<QueueCore>) {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
        state.queues.push(queue);
    }

    pub(crate) fn unregister_queue(&self, queue: &Arc<QueueCore>) {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        if let Some(position) = state.queues.iter().position(|q| Arc::ptr_eq(q, queue)) {
            // Constant-time removal; queue order carries no meaning.
            state.queues.swap_remove(position);
        }

        if state.next_queue >= state.queues.len() {
            state.next_queue = 0;
        }
    }
}

impl fmt::Debug for PoolCore {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolCore")
            .field("stack_size", &self.stack_size)
            .finish_non_exhaustive()
    }
}
