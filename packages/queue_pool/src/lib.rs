#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! This package provides [`ThreadPool`], a resizable set of worker threads
//! that fairly drains any number of independently created [`TaskQueue`]s.
//!
//! Any number of queues can attach to one pool at any time. Workers visit the
//! queues round-robin, so a queue that is flooded with tasks cannot starve the
//! others. Each queue additionally controls its own behavior:
//!
//! - **Bounded capacity**: a queue holds at most a fixed number of
//!   submitted-but-not-yet-running tasks. A submitter that outruns the pool
//!   executes queued tasks on its own thread until space opens up, so
//!   [`TaskQueue::submit()`] never fails and never drops a task.
//! - **Concurrency cap**: a queue may limit how many of its tasks execute
//!   simultaneously across the whole pool, independent of the worker count,
//!   and may change that limit at runtime.
//!
//! The pool itself can grow or shrink at runtime via
//! [`ThreadPool::set_thread_count()`]; shrinking never interrupts a task that
//! is already running. A pool with zero workers is valid and leaves all
//! execution to submitters and waiters, which is handy for deterministic
//! tests.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use new_zealand::nz;
//! use queue_pool::{Task, TaskQueue, ThreadPool};
//!
//! let pool = ThreadPool::builder().thread_count(2).build().unwrap();
//!
//! // Two independent queues sharing the same workers; the second one allows
//! // at most one of its tasks to run at a time.
//! let unordered = TaskQueue::new(&pool, nz!(64), None);
//! let serialized = TaskQueue::new(&pool, nz!(64), Some(nz!(1)));
//!
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! for queue in [&unordered, &serialized] {
//!     queue.submit((0..10).map(|_| {
//!         let counter = Arc::clone(&counter);
//!         Task::new(move || {
//!             counter.fetch_add(1, Ordering::Relaxed);
//!         })
//!     }));
//! }
//!
//! unordered.wait_for_tasks();
//! serialized.wait_for_tasks();
//! assert_eq!(counter.load(Ordering::Relaxed), 20);
//!
//! // Checked teardown: queues must detach first.
//! drop(unordered);
//! drop(serialized);
//! pool.shutdown().unwrap();
//! ```

mod builder;
mod constants;
mod error;
mod pool;
mod queue;
mod slots;
mod task;
mod worker;

pub use builder::*;
pub use constants::MAX_THREADS;
pub use error::*;
pub use pool::ThreadPool;
pub use queue::TaskQueue;
pub use task::*;
