//! Basic usage of the `queue_pool` crate:
//!
//! * Creating a pool.
//! * Attaching a task queue.
//! * Submitting tasks.
//! * Waiting for completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use new_zealand::nz;
use queue_pool::{Task, TaskQueue, ThreadPool};

fn main() {
    let pool = ThreadPool::new().unwrap();
    println!("Pool started with {} worker threads", pool.thread_count());

    // The queue holds at most 64 tasks that are submitted but not yet running.
    let queue = TaskQueue::new(&pool, nz!(64), None);

    let counter = Arc::new(AtomicUsize::new(0));

    // Tasks from one submit() call run in the order given.
    queue.submit((0..100).map(|i| {
        let counter = Arc::clone(&counter);
        Task::new(move || {
            counter.fetch_add(i, Ordering::Relaxed);
        })
    }));

    // The waiting thread pitches in and executes queued tasks itself.
    queue.wait_for_tasks();
    println!("Sum computed by the pool: {}", counter.load(Ordering::Relaxed));

    // Checked teardown: the queue must detach before the pool shuts down.
    drop(queue);
    pool.shutdown().unwrap();
    println!("Pool shut down cleanly");
}
