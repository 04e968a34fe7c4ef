//! One-shot completion signal shared between threads.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// A gate that starts closed and can be opened exactly once.
///
/// Opening is idempotent: only the first call reports that it opened the
/// latch, later calls are no-ops. Waiters are released as soon as the latch
/// opens and never block once it is open.
#[derive(Debug, Default)]
pub struct Latch {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the latch. Returns `true` if this call opened it.
    pub fn open(&self) -> bool {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if *open {
            return false;
        }
        *open = true;
        self.cond.notify_all();
        true
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the latch is open.
    pub fn wait(&self) {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let _open = self
            .cond
            .wait_while(open, |open| !*open)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Blocks until the latch is open or `timeout` elapses.
    ///
    /// Returns `true` if the latch is open.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let (open, _) = self
            .cond
            .wait_timeout_while(open, timeout, |open| !*open)
            .unwrap_or_else(PoisonError::into_inner);
        *open
    }
}

/// Opens the wrapped latch when dropped, on every exit path.
pub(crate) struct OpenOnDrop<'a>(pub(crate) &'a Latch);

impl Drop for OpenOnDrop<'_> {
    fn drop(&mut self) {
        self.0.open();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_open_once() {
        let latch = Latch::new();
        assert!(!latch.is_open());
        assert!(latch.open());
        assert!(!latch.open());
        assert!(latch.is_open());
    }

    #[test]
    fn test_wait_timeout_expires_when_closed() {
        let latch = Latch::new();
        let started = Instant::now();
        assert!(!latch.wait_timeout(Duration::from_millis(50)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_timeout_returns_immediately_when_open() {
        let latch = Latch::new();
        latch.open();
        let started = Instant::now();
        assert!(latch.wait_timeout(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_open_releases_waiters() {
        let latch = Arc::new(Latch::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let latch = Arc::clone(&latch);
                thread::spawn(move || latch.wait_timeout(Duration::from_secs(10)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        latch.open();

        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn test_concurrent_open_reports_single_opener() {
        let latch = Arc::new(Latch::new());
        let openers: Vec<_> = (0..8)
            .map(|_| {
                let latch = Arc::clone(&latch);
                thread::spawn(move || latch.open())
            })
            .collect();

        let opened = openers
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|opened| *opened)
            .count();
        assert_eq!(opened, 1);
    }

    #[test]
    fn test_open_on_drop() {
        let latch = Latch::new();
        {
            let _guard = OpenOnDrop(&latch);
            assert!(!latch.is_open());
        }
        assert!(latch.is_open());
    }
}
