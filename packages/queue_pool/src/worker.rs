//! The loop every pool worker thread runs.
//!
//! A worker moves between four states: it announces itself (Starting), scans
//! queues round-robin for an admissible task (Scanning), sleeps on the work
//! signal when nothing is eligible (Waiting) and exits when the pool stops or
//! a shrink removes it (Stopping). Tasks always execute outside every lock.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use scopeguard::defer;

use crate::constants::ERR_POISONED_LOCK;
use crate::pool::{PoolCore, PoolState};
use crate::queue::QueueCore;
use crate::task::Task;

/// Spawns the worker with index `index`. The worker owns a handle to the pool
/// core and its own index; nothing else identifies it.
pub(crate) fn spawn(
    core: &Arc<PoolCore>,
    index: usize,
) -> io::Result<thread::JoinHandle<()>> {
    let mut builder = thread::Builder::new().name(format!("queue-pool-{index}"));
    if let Some(stack_size) = core.stack_size {
        builder = builder.stack_size(stack_size);
    }

    let core = Arc::clone(core);
    builder.spawn(move || run(&core, index))
}

fn run(core: &PoolCore, index: usize) {
    // Hook panics are neutralized for the same reason task panics are below:
    // the pool counts on this thread staying alive until a resize removes it.
    if let Some(hook) = &core.worker_start {
        drop(panic::catch_unwind(AssertUnwindSafe(|| hook(index))));
    }

    let mut state = core.state.lock().expect(ERR_POISONED_LOCK);

    // Starting: signal whoever is waiting for this worker to come up.
    debug_assert!(state.pending_workers > 0);
    state.pending_workers -= 1;
    if state.pending_workers == 0 {
        core.resize_signal.notify_all();
    }

    loop {
        if state.stop {
            break;
        }

        if index >= state.thread_count {
            // A shrink removed this worker; acknowledge and exit.
            state.pending_workers -= 1;
            if state.pending_workers == 0 {
                core.resize_signal.notify_all();
            }
            break;
        }

        match claim_task(&mut state) {
            Some((queue, task)) => {
                drop(state);

                {
                    // The claim already counted this task as executing; make
                    // sure the count comes back down even if the task panics.
                    defer! {
                        queue.executing.fetch_sub(1, Ordering::AcqRel);
                    }

                    // A panicking task must not take the worker down with it.
                    // The pool counts this worker as alive until a resize
                    // removes it, so dying here would leave a later shrink
                    // waiting forever for an acknowledgment that never comes.
                    drop(panic::catch_unwind(AssertUnwindSafe(|| task.run())));
                }

                state = core.state.lock().expect(ERR_POISONED_LOCK);
            }
            None => {
                // Waiting: nothing eligible until the state changes.
                state = core.work_signal.wait(state).expect(ERR_POISONED_LOCK);
            }
        }
    }
    drop(state);

    if let Some(hook) = &core.worker_stop {
        drop(panic::catch_unwind(AssertUnwindSafe(|| hook(index))));
    }
}

/// Scans the queues round-robin starting at the cursor and claims at most one
/// task, leaving the owning queue's executing count incremented for it.
///
/// Admission uses check-then-increment-then-verify: the executing count is
/// optimistically incremented, and whoever finds the limit exceeded (or the
/// queue empty) backs out by decrementing again. Losing that race is harmless;
/// the task stays queued for the next scan.
fn claim_task(state: &mut PoolState) -> Option<(Arc<QueueCore>, Task)> {
    let queue_count = state.queues.len();

    for offset in 0..queue_count {
        let position = (state.next_queue + offset) % queue_count;
        let queue = Arc::clone(&state.queues[position]);

        let limit = queue.max_concurrency.load(Ordering::Relaxed);
        let previously_executing = queue.executing.fetch_add(1, Ordering::AcqRel);
        if limit == 0 || previously_executing < limit {
            if let Some(task) = queue.pop_task(state) {
                // Resume the next scan one past this queue so queues later in
                // the array are never starved.
                state.next_queue = (position + 1) % queue_count;
                return Some((queue, task));
            }
        }

        queue.executing.fetch_sub(1, Ordering::AcqRel);
    }

    None
}
