//! Resizing a pool while work is flowing through it.
//!
//! The pool grows and shrinks between batches; no task is ever lost and a
//! shrink never interrupts a task that is already running.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use new_zealand::nz;
use queue_pool::{Task, TaskQueue, ThreadPool};

const BATCH: usize = 50;

fn main() {
    // Start with no workers at all; submission still works because the
    // waiting side executes tasks itself when nobody else does.
    let pool = ThreadPool::builder().thread_count(0).build().unwrap();
    let queue = TaskQueue::new(&pool, nz!(128), None);

    let completed = Arc::new(AtomicUsize::new(0));

    for target in [0, 4, 1, 8, 0] {
        queue.submit((0..BATCH).map(|_| {
            let completed = Arc::clone(&completed);
            Task::new(move || {
                completed.fetch_add(1, Ordering::Relaxed);
            })
        }));

        // Blocks until the pool has settled at the new size.
        pool.set_thread_count(target).unwrap();
        println!(
            "resized to {} workers; {} tasks completed so far",
            pool.thread_count(),
            completed.load(Ordering::Relaxed)
        );
    }

    queue.wait_for_tasks();
    println!(
        "all {} tasks completed exactly once",
        completed.load(Ordering::Relaxed)
    );
}
