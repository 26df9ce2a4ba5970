use std::collections::VecDeque;
use std::fmt;
use std::num::NonZero;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use scopeguard::defer;

use crate::ThreadPool;
use crate::constants::ERR_POISONED_LOCK;
use crate::pool::{PoolCore, PoolState};
use crate::slots::TaskSlots;
use crate::task::Task;

/// An independent FIFO of [`Task`]s serviced by a shared [`ThreadPool`].
///
/// Any number of queues can attach to the same pool; workers visit them
/// round-robin. Each queue bounds how many submitted-but-not-yet-run tasks it
/// holds (`capacity`) and optionally caps how many of its tasks may be
/// mid-execution across the whole pool at once (`max_concurrency`).
///
/// # Backpressure
///
/// When a submission finds the queue at capacity, the submitting thread flushes
/// what it has staged and executes queued tasks itself until space opens up.
/// A producer that outruns the pool therefore throttles itself by doing the
/// pool's work; [`submit()`][Self::submit] never fails and never drops a task.
///
/// # Task panics
///
/// A task that panics on a pool worker is contained: the worker stays alive
/// and keeps servicing queues, and the queue's bookkeeping is unaffected. A
/// task that panics while running inline, on a submitting or waiting thread,
/// propagates on that thread instead. When that happens during
/// [`submit()`][Self::submit], tasks from the same call that were not yet
/// enqueued are dropped without running; tasks already enqueued stay in the
/// queue, and no capacity is lost either way.
///
/// # Teardown
///
/// Dropping a queue first drains it (remaining tasks run on the dropping
/// thread when no worker picks them up) and then detaches it from the pool.
/// The pool itself refuses checked shutdown while queues are attached.
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
/// let pool = ThreadPool::builder().thread_count(1).build().unwrap();
///
/// // At most 2 of this queue's tasks may run concurrently, pool-wide.
/// let queue = TaskQueue::new(&pool, nz!(32), Some(nz!(2)));
///
/// let counter = Arc::new(AtomicUsize::new(0));
/// queue.submit((0..4).map(|_| {
///     let counter = Arc::clone(&counter);
///     Task::new(move || {
///         counter.fetch_add(1, Ordering::Relaxed);
///     })
/// }));
///
/// queue.wait_for_tasks();
/// assert_eq!(counter.load(Ordering::Relaxed), 4);
/// ```
#[derive(Debug)]
pub struct TaskQueue {
    core: Arc<QueueCore>,
}

/// Queue state shared with the pool's workers.
pub(crate) struct QueueCore {
    pub(crate) pool: Arc<PoolCore>,

    /// The shared FIFO. Only ever locked while the pool's state mutex is held
    /// (strict state-then-fifo order), so it is uncontended by construction;
    /// requiring `&mut PoolState` in the accessors enforces that discipline.
    pending: Mutex<VecDeque<Task>>,

    /// Bounded accounting for outstanding entries; stands in for the fixed
    /// capacity node allocator described in the queue's contract.
    slots: TaskSlots,

    /// Pool-wide cap on this queue's concurrently executing tasks.
    /// Zero means unlimited.
    pub(crate) max_concurrency: AtomicUsize,

    /// How many of this queue's tasks are mid-execution right now. Incremented
    /// before a task body is invoked and decremented right after, on whatever
    /// thread runs it.
    pub(crate) executing: AtomicUsize,

    /// Serializes submitters so each call's tasks land in the FIFO as one
    /// contiguous run. Never held while blocking on the pool's state mutex or
    /// while executing a task body.
    staging: Mutex<()>,
}

impl TaskQueue {
    /// Creates a queue attached to `pool`.
    ///
    /// `capacity` bounds how many tasks may be queued-but-not-yet-running at
    /// any instant; submissions beyond it make the submitting thread work the
    /// queue off inline. `max_concurrency` caps how many of this queue's tasks
    /// may execute simultaneously across the whole pool; `None` means
    /// unlimited.
    #[must_use]
    pub fn new(
        pool: &ThreadPool,
        capacity: NonZero<usize>,
        max_concurrency: Option<NonZero<usize>>,
    ) -> Self {
        let core = Arc::new(QueueCore {
            pool: Arc::clone(&pool.core),
            pending: Mutex::new(VecDeque::new()),
            slots: TaskSlots::new(capacity),
            max_concurrency: AtomicUsize::new(max_concurrency.map_or(0, NonZero::get)),
            executing: AtomicUsize::new(0),
            staging: Mutex::new(()),
        });

        pool.core.register_queue(Arc::clone(&core));

        Self { core }
    }

    /// How many queued-but-not-yet-running tasks this queue can hold.
    #[must_use]
    pub fn capacity(&self) -> NonZero<usize> {
        self.core.slots.capacity()
    }

    /// The current concurrency cap; `None` means unlimited.
    #[must_use]
    pub fn max_concurrency(&self) -> Option<NonZero<usize>> {
        NonZero::new(self.core.max_concurrency.load(Ordering::Relaxed))
    }

    /// Changes the concurrency cap.
    ///
    /// Raising the effective limit (including raising it to unlimited) wakes
    /// all pool workers, since tasks previously held back may now be
    /// admissible. Tasks already mid-execution are unaffected either way.
    pub fn set_max_concurrency(&self, max_concurrency: Option<NonZero<usize>>) {
        let core = &self.core;

        // Held purely to serialize with worker admission checks; the value
        // itself is read with a plain atomic load elsewhere.
        let _state = core.pool.state.lock().expect(ERR_POISONED_LOCK);

        let new = max_concurrency.map_or(0, NonZero::get);
        let previous = core.max_concurrency.swap(new, Ordering::Relaxed);

        let raised = match (previous, new) {
            (0, _) => false,
            (_, 0) => true,
            (previous, new) => new > previous,
        };
        if raised {
            core.pool.work_signal.notify_all();
        }
    }

    /// Enqueues a batch of tasks and wakes the pool.
    ///
    /// Tasks submitted by one call execute in the order supplied, relative to
    /// each other; no order is guaranteed against tasks from other calls.
    ///
    /// If the queue is at capacity, the calling thread executes queued tasks
    /// itself until space opens up, so this call can take a while under
    /// backpressure, but it never fails and never drops a task.
    pub fn submit<I>(&self, tasks: I)
    where
        I: IntoIterator<Item = Task>,
    {
        let tasks: Vec<Task> = tasks.into_iter().collect();
        if tasks.is_empty() {
            return;
        }

        let core = &self.core;
        let mut staged: VecDeque<Task> = VecDeque::with_capacity(tasks.len());

        let mut staging = core.staging.lock().expect(ERR_POISONED_LOCK);

        for task in tasks {
            while !core.slots.try_reserve() {
                // At capacity. Hand over what is staged so far and work one
                // task off on this thread. The staging lock must not be held
                // across the state mutex or the task body.
                drop(staging);
                core.execute_one_displaced(&mut staged);
                staging = core.staging.lock().expect(ERR_POISONED_LOCK);
            }
            staged.push_back(task);
        }

        drop(staging);

        let mut state = core.pool.state.lock().expect(ERR_POISONED_LOCK);
        core.commit(&mut state, &mut staged);
        core.pool.work_signal.notify_all();
    }

    /// Blocks until every task in the queue has finished.
    ///
    /// The calling thread pitches in: it pops and executes queued tasks itself
    /// (ignoring the concurrency cap, though still counted against it) and
    /// yields while only in-flight tasks remain. On return the queue holds no
    /// pending tasks and none of its tasks are executing, barring new
    /// submissions racing in concurrently.
    pub fn wait_for_tasks(&self) {
        let core = &self.core;

        loop {
            let popped = {
                let mut state = core.pool.state.lock().expect(ERR_POISONED_LOCK);
                match core.pop_task(&mut state) {
                    Some(task) => {
                        // Counted so workers keep respecting the cap, but run
                        // here regardless of it.
                        core.executing.fetch_add(1, Ordering::AcqRel);
                        Some(task)
                    }
                    None => {
                        if core.executing.load(Ordering::Acquire) == 0 {
                            // Nothing pending, nothing in flight: drained.
                            return;
                        }
                        None
                    }
                }
            };

            match popped {
                Some(task) => {
                    defer! {
                        core.executing.fetch_sub(1, Ordering::AcqRel);
                    }
                    task.run();
                }
                None => {
                    // Tasks are still running on other threads.
                    thread::yield_now();
                }
            }
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        // Drain while still registered so workers can help finish.
        self.wait_for_tasks();
        self.core.pool.unregister_queue(&self.core);
    }
}

impl QueueCore {
    /// Pops the head task, if any. Requiring `&mut PoolState` means the caller
    /// provably holds the pool's state mutex, which is what keeps the FIFO
    /// consistent with worker admission.
    pub(crate) fn pop_task(&self, _state: &mut PoolState) -> Option<Task> {
        let task = self.pending.lock().expect(ERR_POISONED_LOCK).pop_front()?;
        self.slots.release();
        Some(task)
    }

    /// Splices a staged run onto the end of the shared FIFO.
    fn commit(&self, _state: &mut PoolState, staged: &mut VecDeque<Task>) {
        if staged.is_empty() {
            return;
        }
        self.pending.lock().expect(ERR_POISONED_LOCK).append(staged);
    }

    /// The overflow path of `submit`: commits any staged tasks, then pops one
    /// task and executes it on the calling thread.
    fn execute_one_displaced(&self, staged: &mut VecDeque<Task>) {
        let task = {
            let mut state = self.pool.state.lock().expect(ERR_POISONED_LOCK);
            self.commit(&mut state, staged);

            let Some(task) = self.pop_task(&mut state) else {
                // Another thread popped everything right after capacity ran
                // out; the submitter can simply retry its reservation.
                return;
            };

            // Counted so waiters see the queue as busy until the task is done.
            self.executing.fetch_add(1, Ordering::AcqRel);

            // Other threads can keep grabbing tasks in the meantime.
            if !self.pending.lock().expect(ERR_POISONED_LOCK).is_empty() {
                self.pool.work_signal.notify_all();
            }

            task
        };

        defer! {
            self.executing.fetch_sub(1, Ordering::AcqRel);
        }
        task.run();
    }
}

impl fmt::Debug for QueueCore {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueCore")
            .field("slots", &self.slots)
            .field("max_concurrency", &self.max_concurrency)
            .field("executing", &self.executing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    use new_zealand::nz;
    use static_assertions::assert_impl_all;
    use testing::with_watchdog;

    use super::*;

    assert_impl_all!(TaskQueue: Send, Sync);

    /// A pool with no workers, so tests control exactly when and where tasks run.
    fn inert_pool() -> ThreadPool {
        ThreadPool::builder().thread_count(0).build().unwrap()
    }

    fn recording_task(record: &Arc<Mutex<Vec<usize>>>, index: usize) -> Task {
        let record = Arc::clone(record);
        Task::new(move || {
            record.lock().unwrap().push(index);
        })
    }

    #[test]
    fn wait_runs_all_tasks_in_submission_order() {
        with_watchdog(|| {
            let pool = inert_pool();
            let queue = TaskQueue::new(&pool, nz!(5), None);

            let record = Arc::new(Mutex::new(Vec::new()));
            queue.submit((0..5).map(|i| recording_task(&record, i)));

            // No workers, so nothing may have run yet.
            assert!(record.lock().unwrap().is_empty());

            queue.wait_for_tasks();
            assert_eq!(*record.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        });
    }

    #[test]
    fn submitting_over_capacity_runs_tasks_inline() {
        with_watchdog(|| {
            let pool = inert_pool();
            let queue = TaskQueue::new(&pool, nz!(3), None);

            let record = Arc::new(Mutex::new(Vec::new()));
            queue.submit((0..5).map(|i| recording_task(&record, i)));

            // Two tasks were displaced onto this thread while submitting, in
            // submission order.
            assert_eq!(*record.lock().unwrap(), vec![0, 1]);

            queue.wait_for_tasks();
            assert_eq!(*record.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        });
    }

    #[test]
    fn capacity_of_one_self_throttles_submission() {
        with_watchdog(|| {
            let pool = inert_pool();
            let queue = TaskQueue::new(&pool, nz!(1), None);

            let record = Arc::new(Mutex::new(Vec::new()));
            queue.submit((0..5).map(|i| recording_task(&record, i)));

            // With a single slot, every reservation after the first displaces
            // the previous task onto the submitting thread; only the final
            // task is left in the queue when submit returns.
            assert_eq!(*record.lock().unwrap(), vec![0, 1, 2, 3]);

            queue.wait_for_tasks();
            assert_eq!(*record.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        });
    }

    #[test]
    fn empty_submission_is_a_no_op() {
        with_watchdog(|| {
            let pool = inert_pool();
            let queue = TaskQueue::new(&pool, nz!(4), None);

            queue.submit(std::iter::empty());
            queue.wait_for_tasks();
        });
    }

    #[test]
    fn drop_drains_remaining_tasks() {
        with_watchdog(|| {
            let pool = inert_pool();
            let queue = TaskQueue::new(&pool, nz!(5), None);

            let record = Arc::new(Mutex::new(Vec::new()));
            queue.submit((0..5).map(|i| recording_task(&record, i)));
            assert!(record.lock().unwrap().is_empty());

            drop(queue);
            assert_eq!(*record.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        });
    }

    #[test]
    fn inline_panic_leaves_capacity_intact() {
        with_watchdog(|| {
            let pool = inert_pool();
            let queue = TaskQueue::new(&pool, nz!(1), None);

            let record = Arc::new(Mutex::new(Vec::new()));

            // With a single slot the second reservation displaces the
            // panicking head task onto this thread; the panic unwinds out of
            // submit and drops the rest of the batch unsubmitted.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                queue.submit([
                    Task::new(|| panic!("inline failure")),
                    recording_task(&record, 1),
                ]);
            }));
            assert!(result.is_err());
            assert!(record.lock().unwrap().is_empty());

            // Every slot must have been returned: the queue still accepts and
            // runs new work up to its full capacity.
            queue.submit([recording_task(&record, 2)]);
            queue.wait_for_tasks();
            assert_eq!(*record.lock().unwrap(), vec![2]);
        });
    }

    #[test]
    fn task_may_submit_to_its_own_queue() {
        with_watchdog(|| {
            const TASKS: usize = 5;

            let pool = inert_pool();
            let queue = Arc::new(TaskQueue::new(&pool, NonZero::new(TASKS).unwrap(), None));

            let record = Arc::new(Mutex::new(Vec::new()));

            fn chain(queue: &Arc<TaskQueue>, record: &Arc<Mutex<Vec<usize>>>, index: usize) -> Task {
                let queue = Arc::clone(queue);
                let record = Arc::clone(record);
                Task::new(move || {
                    record.lock().unwrap().push(index);
                    if index + 1 < TASKS {
                        queue.submit([chain(&queue, &record, index + 1)]);
                    }
                })
            }

            queue.submit([chain(&queue, &record, 0)]);
            queue.wait_for_tasks();

            assert_eq!(*record.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        });
    }

    #[test]
    fn concurrency_cap_is_never_exceeded() {
        with_watchdog(|| {
            const TASKS: usize = if cfg!(miri) { 6 } else { 20 };
            const CAP: usize = 2;

            let pool = inert_pool();
            let queue = TaskQueue::new(
                &pool,
                NonZero::new(TASKS).unwrap(),
                Some(NonZero::new(CAP).unwrap()),
            );

            let current = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));
            let finished = Arc::new((Mutex::new(0_usize), Condvar::new()));

            queue.submit((0..TASKS).map(|_| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                let finished = Arc::clone(&finished);
                Task::new(move || {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);

                    thread::sleep(Duration::from_millis(1));

                    current.fetch_sub(1, Ordering::SeqCst);
                    let (count, signal) = &*finished;
                    let mut count = count.lock().unwrap();
                    *count += 1;
                    if *count == TASKS {
                        signal.notify_all();
                    }
                })
            }));

            // More workers than the cap allows to run at once.
            pool.set_thread_count(4).unwrap();

            let (count, signal) = &*finished;
            let mut count = count.lock().unwrap();
            while *count < TASKS {
                count = signal.wait(count).unwrap();
            }
            drop(count);

            let peak = peak.load(Ordering::SeqCst);
            assert!(peak >= 1);
            assert!(peak <= CAP);
        });
    }

    #[test]
    fn single_worker_services_queues_round_robin() {
        with_watchdog(|| {
            const QUEUES: usize = 3;
            const TASKS: usize = 4;

            let pool = inert_pool();
            let queues: Vec<_> = (0..QUEUES)
                .map(|_| TaskQueue::new(&pool, NonZero::new(TASKS).unwrap(), None))
                .collect();

            let order = Arc::new(Mutex::new(Vec::new()));
            let finished = Arc::new((Mutex::new(0_usize), Condvar::new()));

            for (queue_index, queue) in queues.iter().enumerate() {
                queue.submit((0..TASKS).map(|task_index| {
                    let order = Arc::clone(&order);
                    let finished = Arc::clone(&finished);
                    Task::new(move || {
                        order.lock().unwrap().push((queue_index, task_index));
                        let (count, signal) = &*finished;
                        let mut count = count.lock().unwrap();
                        *count += 1;
                        if *count == QUEUES * TASKS {
                            signal.notify_all();
                        }
                    })
                }));
            }

            // A single worker makes the service order fully deterministic.
            pool.set_thread_count(1).unwrap();

            let (count, signal) = &*finished;
            let mut count = count.lock().unwrap();
            while *count < QUEUES * TASKS {
                count = signal.wait(count).unwrap();
            }
            drop(count);

            // Strict rotation: q0 t0, q1 t0, q2 t0, q0 t1, ...
            let order = order.lock().unwrap();
            assert_eq!(order.len(), QUEUES * TASKS);
            for (position, &(queue_index, task_index)) in order.iter().enumerate() {
                assert_eq!(queue_index, position % QUEUES);
                assert_eq!(task_index, position / QUEUES);
            }
        });
    }

    #[test]
    fn raising_concurrency_cap_lets_tasks_finish() {
        with_watchdog(|| {
            let pool = ThreadPool::builder().thread_count(2).build().unwrap();
            let queue = TaskQueue::new(&pool, nz!(8), Some(nz!(1)));

            let counter = Arc::new(AtomicUsize::new(0));
            queue.submit((0..6).map(|_| {
                let counter = Arc::clone(&counter);
                Task::new(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
            }));

            queue.set_max_concurrency(None);
            queue.wait_for_tasks();

            assert_eq!(counter.load(Ordering::Relaxed), 6);
        });
    }

    #[test]
    fn concurrency_cap_accessor_round_trips() {
        with_watchdog(|| {
            let pool = inert_pool();
            let queue = TaskQueue::new(&pool, nz!(4), Some(nz!(3)));

            assert_eq!(queue.capacity(), nz!(4));
            assert_eq!(queue.max_concurrency(), Some(nz!(3)));

            queue.set_max_concurrency(None);
            assert_eq!(queue.max_concurrency(), None);

            queue.set_max_concurrency(Some(nz!(1)));
            assert_eq!(queue.max_concurrency(), Some(nz!(1)));
        });
    }

    #[test]
    fn wait_returns_once_drained() {
        with_watchdog(|| {
            let pool = ThreadPool::builder().thread_count(2).build().unwrap();
            let queue = TaskQueue::new(&pool, nz!(16), None);

            let counter = Arc::new(AtomicUsize::new(0));
            for _ in 0..3 {
                queue.submit((0..8).map(|_| {
                    let counter = Arc::clone(&counter);
                    Task::new(move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    })
                }));
                queue.wait_for_tasks();
            }

            assert_eq!(counter.load(Ordering::Relaxed), 24);
        });
    }
}
