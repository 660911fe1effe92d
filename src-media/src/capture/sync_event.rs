//! Auto-reset event used to pace the render thread against the device.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Auto-reset event: one successful wait consumes one signal.
///
/// A signal raised while nobody waits stays pending until the next wait or
/// [`SyncEvent::reset`].
#[derive(Debug, Default)]
pub struct SyncEvent {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl SyncEvent {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.signaled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn signal(&self) {
        *self.flag() = true;
        self.condvar.notify_one();
    }

    /// Wait until signalled or `timeout` elapses. Returns `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.flag();
        let (mut guard, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |signaled| !*signaled)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, false)
    }

    /// Drop a pending signal.
    pub fn reset(&self) {
        *self.flag() = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_pending_signal_is_consumed_once() {
        let event = SyncEvent::new();
        event.signal();
        assert!(event.wait_timeout(Duration::from_millis(10)));
        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_reset_drops_pending_signal() {
        let event = SyncEvent::new();
        event.signal();
        event.reset();
        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let event = Arc::new(SyncEvent::new());
        let waiter = {
            let event = Arc::clone(&event);
            thread::spawn(move || {
                let start = Instant::now();
                let woke = event.wait_timeout(Duration::from_secs(5));
                (woke, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        event.signal();

        let (woke, elapsed) = waiter.join().unwrap();
        assert!(woke);
        assert!(elapsed < Duration::from_secs(5));
    }
}
