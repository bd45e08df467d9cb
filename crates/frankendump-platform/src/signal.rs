//! Waitable events.
//!
//! [`Signal`] is a settable event flag a thread can block on, with an
//! optional timeout. [`wait_any`] blocks on a whole set of signals at once
//! and reports which one fired, which is how the detection loop multiplexes
//! the state-change, timeout and exit events, and how a transfer waits on
//! "completion or shutdown" while a session is still being negotiated.
//!
//! A signal is either manually reset (`clear` must be called, like an
//! endpoint completion event) or auto-clearing (consumed by the waiter that
//! observes it, like a usermode wake-up event).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A single waiter parked in [`wait_any`]. The flag is raised by any signal
/// in the waited set and re-checked before every sleep, so a wake-up that
/// lands between the flag scan and the park is never lost.
struct Waiter {
    woken: Mutex<bool>,
    cv: Condvar,
}

struct SignalCore {
    set: Mutex<bool>,
    waiters: Mutex<Vec<Arc<Waiter>>>,
}

/// A waitable event flag. Cloning yields another handle to the same event.
#[derive(Clone)]
pub struct Signal {
    core: Arc<SignalCore>,
    auto_clear: bool,
}

impl Signal {
    #[must_use]
    pub fn new(auto_clear: bool) -> Self {
        Self {
            core: Arc::new(SignalCore {
                set: Mutex::new(false),
                waiters: Mutex::new(Vec::new()),
            }),
            auto_clear,
        }
    }

    /// Raise the event and wake every parked waiter.
    pub fn signal(&self) {
        *self.core.set.lock() = true;
        for waiter in self.core.waiters.lock().iter() {
            let mut woken = waiter.woken.lock();
            *woken = true;
            waiter.cv.notify_all();
        }
    }

    /// Lower the event. No-op if it is not set.
    pub fn clear(&self) {
        *self.core.set.lock() = false;
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.core.set.lock()
    }

    /// Block until the event fires or `timeout` elapses. Returns `true` if
    /// the event fired. An auto-clear signal is consumed by the return.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        wait_any(&[self], timeout).is_some()
    }

    /// Observe-and-consume used by the selection loop in [`wait_any`].
    fn try_take(&self) -> bool {
        let mut set = self.core.set.lock();
        if *set {
            if self.auto_clear {
                *set = false;
            }
            true
        } else {
            false
        }
    }

    fn attach(&self, waiter: &Arc<Waiter>) {
        self.core.waiters.lock().push(Arc::clone(waiter));
    }

    fn detach(&self, waiter: &Arc<Waiter>) {
        self.core
            .waiters
            .lock()
            .retain(|other| !Arc::ptr_eq(other, waiter));
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("set", &self.is_set())
            .field("auto_clear", &self.auto_clear)
            .finish()
    }
}

/// Block until one of `signals` fires, returning its index, or until
/// `timeout` elapses, returning `None`. When several signals are already
/// set, the lowest index wins. Auto-clear signals are consumed only by the
/// waiter that selects them.
pub fn wait_any(signals: &[&Signal], timeout: Option<Duration>) -> Option<usize> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let waiter = Arc::new(Waiter {
        woken: Mutex::new(false),
        cv: Condvar::new(),
    });

    for signal in signals {
        signal.attach(&waiter);
    }

    let selected = loop {
        if let Some(idx) = signals.iter().position(|signal| signal.try_take()) {
            break Some(idx);
        }

        let mut woken = waiter.woken.lock();
        if !*woken {
            match deadline {
                Some(deadline) => {
                    let result = waiter.cv.wait_until(&mut woken, deadline);
                    if result.timed_out() && !*woken {
                        break None;
                    }
                }
                None => waiter.cv.wait(&mut woken),
            }
        }
        *woken = false;
    };

    for signal in signals {
        signal.detach(&waiter);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_signal_set_before_wait() {
        let signal = Signal::new(false);
        signal.signal();
        assert!(signal.wait(Some(Duration::from_millis(10))));
        // Manual reset: still set afterwards.
        assert!(signal.is_set());
        signal.clear();
        assert!(!signal.is_set());
    }

    #[test]
    fn test_auto_clear_consumed_by_waiter() {
        let signal = Signal::new(true);
        signal.signal();
        assert!(signal.wait(Some(Duration::from_millis(10))));
        assert!(!signal.is_set());
        assert!(!signal.wait(Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_wait_times_out() {
        let signal = Signal::new(true);
        let start = Instant::now();
        assert!(!signal.wait(Some(Duration::from_millis(20))));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cross_thread_wakeup() {
        let signal = Signal::new(true);
        let remote = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            remote.signal();
        });
        assert!(signal.wait(Some(Duration::from_secs(2))));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_any_selects_fired_signal() {
        let a = Signal::new(true);
        let b = Signal::new(true);
        let c = Signal::new(true);
        b.signal();
        assert_eq!(wait_any(&[&a, &b, &c], Some(Duration::from_millis(50))), Some(1));
        assert!(!b.is_set());
        assert_eq!(wait_any(&[&a, &b, &c], Some(Duration::from_millis(10))), None);
    }

    #[test]
    fn test_wait_any_lowest_index_wins() {
        let a = Signal::new(true);
        let b = Signal::new(true);
        a.signal();
        b.signal();
        assert_eq!(wait_any(&[&a, &b], Some(Duration::from_millis(10))), Some(0));
        // b stays pending for the next wait.
        assert_eq!(wait_any(&[&a, &b], Some(Duration::from_millis(10))), Some(1));
    }

    #[test]
    fn test_wait_any_cross_thread() {
        let a = Signal::new(true);
        let b = Signal::new(true);
        let remote = b.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            remote.signal();
        });
        assert_eq!(wait_any(&[&a, &b], Some(Duration::from_secs(2))), Some(1));
        handle.join().unwrap();
    }
}
