//! One-shot wake-up signal shared between threads.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::lock;

pub type NotifierHandle = Arc<Notifier>;

/// Latching notification: once fired, every current and future waiter
/// returns until [`Notifier::reset`] is called.
pub struct Notifier {
    name: String,
    fired: Mutex<bool>,
    cond: Condvar,
}

impl Notifier {
    pub fn new(name: impl Into<String>) -> NotifierHandle {
        Arc::new(Self {
            name: name.into(),
            fired: Mutex::new(false),
            cond: Condvar::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn notify(&self) {
        let mut fired = lock(&self.fired);
        *fired = true;
        self.cond.notify_all();
    }

    pub fn is_notified(&self) -> bool {
        *lock(&self.fired)
    }

    pub fn wait(&self) {
        let fired = lock(&self.fired);
        let _fired = self
            .cond
            .wait_while(fired, |fired| !*fired)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Returns `false` if the timeout elapsed before the notification.
    pub fn timed_wait(&self, timeout: Duration) -> bool {
        let fired = lock(&self.fired);
        let (fired, _) = self
            .cond
            .wait_timeout_while(fired, timeout, |fired| !*fired)
            .unwrap_or_else(PoisonError::into_inner);
        *fired
    }

    pub fn reset(&self) {
        *lock(&self.fired) = false;
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("name", &self.name)
            .field("fired", &self.is_notified())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wakes_waiter_on_other_thread() {
        let n = Notifier::new("test");
        let waiter = {
            let n = Arc::clone(&n);
            thread::spawn(move || n.wait())
        };
        n.notify();
        waiter.join().unwrap();
        assert!(n.is_notified());
    }

    #[test]
    fn timed_wait_expires() {
        let n = Notifier::new("idle");
        assert!(!n.timed_wait(Duration::from_millis(10)));
        n.notify();
        assert!(n.timed_wait(Duration::from_millis(10)));
        n.reset();
        assert!(!n.is_notified());
    }
}
