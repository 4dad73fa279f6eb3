//! Helpers for the background worker threads.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const JOIN_POLL: Duration = Duration::from_millis(5);

/// Default bound on how long `stop` waits for a worker.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Join `handle`, giving up after `timeout`.
///
/// Returns `None` on timeout; the thread is then left detached.
pub fn join_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration) -> Option<thread::Result<T>> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(JOIN_POLL);
    }
    Some(handle.join())
}
