/// The largest number of worker threads a single [`ThreadPool`][crate::ThreadPool]
/// will manage.
///
/// [`ThreadPool::set_thread_count()`][crate::ThreadPool::set_thread_count] and the
/// builder reject anything above this.
pub const MAX_THREADS: usize = 128;

// A poisoned lock means a thread panicked while holding pool state, so we can no
// longer trust the bookkeeping that keeps tasks exactly-once. Not recoverable.
pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned lock - continued execution \
    is not safe because the pool bookkeeping may no longer be consistent";
