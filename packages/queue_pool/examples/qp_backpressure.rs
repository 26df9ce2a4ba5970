//! Demonstrates the two throttles a queue puts on its producer:
//!
//! * A bounded capacity, which makes a fast producer execute overflow tasks on
//!   its own thread instead of queueing without limit.
//! * A concurrency cap, which bounds how many of the queue's tasks run at the
//!   same time no matter how many workers the pool has.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use new_zealand::nz;
use queue_pool::{Task, TaskQueue, ThreadPool};

const TASKS: usize = 40;

fn main() {
    let pool = ThreadPool::builder().thread_count(4).build().unwrap();

    // Tiny capacity, and at most 2 tasks of this queue in flight at once.
    let queue = TaskQueue::new(&pool, nz!(4), Some(nz!(2)));

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let submitter = thread::current().id();
    let inline = Arc::new(AtomicUsize::new(0));

    queue.submit((0..TASKS).map(|_| {
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        let inline = Arc::clone(&inline);
        Task::new(move || {
            if thread::current().id() == submitter {
                // Ran on the submitting thread because the queue was full.
                inline.fetch_add(1, Ordering::Relaxed);
            }

            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            current.fetch_sub(1, Ordering::SeqCst);
        })
    }));

    println!(
        "submit() returned after running {} of {TASKS} tasks inline",
        inline.load(Ordering::Relaxed)
    );

    queue.wait_for_tasks();
    // Inline execution on the submitter counts toward the cap but is not
    // gated by it, so the peak may briefly sit one above the cap.
    println!(
        "all tasks done; peak concurrency was {} with a cap of 2",
        peak.load(Ordering::SeqCst)
    );
}
