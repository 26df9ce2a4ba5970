use std::fmt;

/// An opaque unit of work: a callable plus whatever state it captured.
///
/// A task is consumed when submitted to a [`TaskQueue`][crate::TaskQueue] and runs
/// exactly once, synchronously, on whichever thread pops it off the queue. That is
/// usually a pool worker but may be the submitting thread itself when the queue is
/// at capacity, or a thread draining the queue via
/// [`wait_for_tasks()`][crate::TaskQueue::wait_for_tasks].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use queue_pool::Task;
///
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// let captured = Arc::clone(&counter);
/// let task = Task::new(move || {
///     captured.fetch_add(1, Ordering::Relaxed);
/// });
/// ```
pub struct Task {
    work: Box<dyn FnOnce() + Send>,
}

impl Task {
    /// Wraps a closure as a unit of schedulable work.
    ///
    /// The closure must be `Send` because any pool worker may end up running it.
    #[must_use]
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            work: Box::new(work),
        }
    }

    /// Executes the task, consuming it.
    pub(crate) fn run(self) {
        (self.work)();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
