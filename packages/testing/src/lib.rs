#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in queue_pool packages.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Runs a test body under a timeout so a deadlocked test kills the run
/// instead of hanging it.
///
/// Most tests in this workspace exercise blocking synchronization primitives,
/// where the typical failure mode of a bug is "waits forever". The watchdog
/// turns that into a panic after 10 seconds (60 under Miri, which executes
/// thread synchronization dramatically slower).
///
/// When the `MUTATION_TESTING` environment variable is set to "1" the watchdog
/// is disabled so that mutation testing can detect hanging mutations itself.
///
/// # Panics
///
/// Panics if the test body does not complete within the timeout.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// with_watchdog(|| {
///     assert_eq!(2 + 2, 4);
/// });
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails the receiver has already timed out; nothing to do.
        drop(tx.send(result));
    });

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded the watchdog timeout");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread disconnected unexpectedly"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}
