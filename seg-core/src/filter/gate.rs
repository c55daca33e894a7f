use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::lock;

/// Counting gate that bounds how many filters compute at once.
///
/// Waiters are woken in condition-variable order; there is no further
/// fairness guarantee.
pub struct FilterGate {
    max: usize,
    live: Mutex<usize>,
    cond: Condvar,
    peak: AtomicUsize,
}

/// One admitted filter. Dropping the permit releases the slot.
pub struct FilterPermit {
    gate: Arc<FilterGate>,
}

impl FilterGate {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            max: max.max(1),
            live: Mutex::new(0),
            cond: Condvar::new(),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Filters currently holding a permit.
    pub fn live(&self) -> usize {
        *lock(&self.live)
    }

    /// Highest number of permits ever held at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Block until a slot is free.
    pub fn acquire(self: &Arc<Self>) -> FilterPermit {
        let live = lock(&self.live);
        let mut live = self
            .cond
            .wait_while(live, |live| *live >= self.max)
            .unwrap_or_else(PoisonError::into_inner);
        *live += 1;
        self.admit(*live)
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<FilterPermit> {
        let mut live = lock(&self.live);
        if *live >= self.max {
            return None;
        }
        *live += 1;
        Some(self.admit(*live))
    }

    /// Like [`FilterGate::acquire`] but gives up after `timeout`.
    pub fn acquire_timeout(self: &Arc<Self>, timeout: Duration) -> Option<FilterPermit> {
        let live = lock(&self.live);
        let (mut live, _) = self
            .cond
            .wait_timeout_while(live, timeout, |live| *live >= self.max)
            .unwrap_or_else(PoisonError::into_inner);
        if *live >= self.max {
            return None;
        }
        *live += 1;
        Some(self.admit(*live))
    }

    /// Block until a slot is free or `abort` is set. `None` means aborted.
    ///
    /// Whoever sets `abort` must call [`FilterGate::wake_all`] afterwards.
    pub fn acquire_or_abort(self: &Arc<Self>, abort: &AtomicBool) -> Option<FilterPermit> {
        let live = lock(&self.live);
        let mut live = self
            .cond
            .wait_while(live, |live| {
                *live >= self.max && !abort.load(Ordering::SeqCst)
            })
            .unwrap_or_else(PoisonError::into_inner);
        if abort.load(Ordering::SeqCst) {
            // A release may have woken us instead of a live waiter.
            if *live < self.max {
                self.cond.notify_one();
            }
            return None;
        }
        *live += 1;
        Some(self.admit(*live))
    }

    /// Wake every waiter so it rechecks its abort flag.
    pub fn wake_all(&self) {
        let _live = lock(&self.live);
        self.cond.notify_all();
    }

    fn admit(self: &Arc<Self>, live: usize) -> FilterPermit {
        self.peak.fetch_max(live, Ordering::SeqCst);
        FilterPermit {
            gate: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut live = lock(&self.live);
        *live = live.saturating_sub(1);
        self.cond.notify_one();
    }
}

impl FilterPermit {
    /// Release now instead of at scope end.
    pub fn release(self) {}
}

impl Drop for FilterPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn bounds_live_permits() {
        let gate = FilterGate::new(2);
        let a = gate.acquire();
        let _b = gate.acquire();
        assert_eq!(gate.live(), 2);
        assert!(gate.try_acquire().is_none());
        assert!(gate.acquire_timeout(Duration::from_millis(10)).is_none());
        a.release();
        assert_eq!(gate.live(), 1);
        assert!(gate.try_acquire().is_some());
        assert_eq!(gate.live(), 1);
    }

    #[test]
    fn waiter_is_admitted_after_release() {
        let gate = FilterGate::new(1);
        let held = gate.acquire();
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let _permit = gate.acquire();
                gate.live()
            })
        };
        thread::sleep(Duration::from_millis(20));
        drop(held);
        assert_eq!(waiter.join().unwrap(), 1);
        assert_eq!(gate.live(), 0);
        assert_eq!(gate.peak(), 1);
    }

    #[test]
    fn abort_wakes_blocked_waiter() {
        let gate = FilterGate::new(1);
        let held = gate.acquire();
        let abort = Arc::new(AtomicBool::new(false));
        let waiter = {
            let gate = Arc::clone(&gate);
            let abort = Arc::clone(&abort);
            thread::spawn(move || gate.acquire_or_abort(&abort).is_some())
        };
        thread::sleep(Duration::from_millis(20));
        abort.store(true, Ordering::SeqCst);
        gate.wake_all();
        assert!(!waiter.join().unwrap());
        assert_eq!(gate.live(), 1);

        drop(held);
        let calm = AtomicBool::new(false);
        assert!(gate.acquire_or_abort(&calm).is_some());
        assert_eq!(gate.live(), 0);
    }

    #[test]
    fn zero_max_is_treated_as_one() {
        let gate = FilterGate::new(0);
        assert_eq!(gate.max(), 1);
        assert!(gate.try_acquire().is_some());
    }
}
