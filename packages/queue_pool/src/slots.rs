use std::num::NonZero;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounded accounting for a queue's outstanding entries.
///
/// This stands in for a fixed-capacity node allocator: a slot must be reserved
/// before a task may be staged for a queue and is released when the task is
/// popped. Reservations happen on the submitter side (under the queue's staging
/// lock) while releases happen under the pool's state mutex, so the counter
/// itself is atomic.
///
/// The counter only guards capacity; task payloads are handed over through the
/// queue's locked FIFO, so relaxed ordering suffices here.
#[derive(Debug)]
pub(crate) struct TaskSlots {
    capacity: NonZero<usize>,
    reserved: AtomicUsize,
}

impl TaskSlots {
    pub(crate) fn new(capacity: NonZero<usize>) -> Self {
        Self {
            capacity,
            reserved: AtomicUsize::new(0),
        }
    }

    /// Claims one slot, returning `false` when every slot is in use.
    pub(crate) fn try_reserve(&self) -> bool {
        self.reserved
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |reserved| {
                if reserved < self.capacity.get() {
                    Some(reserved + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Returns a previously reserved slot.
    pub(crate) fn release(&self) {
        let previously_reserved = self.reserved.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previously_reserved > 0);
    }

    pub(crate) fn capacity(&self) -> NonZero<usize> {
        self.capacity
    }
}
