use std::{
    fmt::{self, Debug},
    sync::Arc,
    time::Duration,
};

use parking_lot::{Condvar, Mutex};

/// Auto-reset event.
///
/// `set` wakes one waiter, or the next one to arrive if none is waiting.
/// Multiple `set` calls without a waiter in between collapse into one.
pub(crate) struct Event {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl Debug for Event {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Event({})", *self.signalled.lock())
    }
}

impl Event {
    pub fn new(signalled: bool) -> Self {
        Event {
            signalled: Mutex::new(signalled),
            cond: Condvar::new(),
        }
    }

    pub fn set(&self) {
        let mut signalled = self.signalled.lock();
        *signalled = true;
        self.cond.notify_one();
    }

    pub fn wait(&self) {
        let mut signalled = self.signalled.lock();
        while !*signalled {
            self.cond.wait(&mut signalled);
        }
        *signalled = false;
    }

    /// Returns `false` if timeout elapsed before the event was set.
    #[cfg(test)]
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut signalled = self.signalled.lock();
        if !*signalled {
            let _ = self.cond.wait_while_for(&mut signalled, |s| !*s, timeout);
        }

        if *signalled {
            *signalled = false;
            true
        } else {
            false
        }
    }
}

struct LatencyInner {
    available: Mutex<u32>,
    maximum: Mutex<u32>,
    cond: Condvar,
}

/// Waitable object released each time a presentation window is handed to the display.
///
/// Waiting on it before starting a frame bounds how many frames the application
/// can queue ahead of the display to the maximum frame latency.
#[derive(Clone)]
pub struct FrameLatencyWaitable {
    inner: Arc<LatencyInner>,
}

impl Debug for FrameLatencyWaitable {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("FrameLatencyWaitable")
            .field("available", &*self.inner.available.lock())
            .field("maximum", &*self.inner.maximum.lock())
            .finish()
    }
}

impl FrameLatencyWaitable {
    pub(crate) fn new(maximum: u32) -> Self {
        FrameLatencyWaitable {
            inner: Arc::new(LatencyInner {
                available: Mutex::new(maximum),
                maximum: Mutex::new(maximum),
                cond: Condvar::new(),
            }),
        }
    }

    /// Blocks until a frame slot is available and takes it.
    /// Returns `false` on timeout.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut available = self.inner.available.lock();
        match timeout {
            None => {
                while *available == 0 {
                    self.inner.cond.wait(&mut available);
                }
            }
            Some(timeout) => {
                if *available == 0 {
                    let _ = self
                        .inner
                        .cond
                        .wait_while_for(&mut available, |a| *a == 0, timeout);
                }
                if *available == 0 {
                    return false;
                }
            }
        }
        *available -= 1;
        true
    }

    pub fn maximum(&self) -> u32 {
        *self.inner.maximum.lock()
    }

    pub(crate) fn set_maximum(&self, maximum: u32) {
        let mut current = self.inner.maximum.lock();
        let mut available = self.inner.available.lock();
        if maximum > *current {
            *available += maximum - *current;
            self.inner.cond.notify_all();
        } else {
            *available = (*available).min(maximum);
        }
        *current = maximum;
    }

    pub(crate) fn release(&self) {
        let maximum = *self.inner.maximum.lock();
        let mut available = self.inner.available.lock();
        if *available < maximum {
            *available += 1;
            self.inner.cond.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn event_is_auto_reset() {
        let event = Event::new(true);
        assert!(event.wait_for(Duration::from_millis(1)));
        assert!(!event.wait_for(Duration::from_millis(1)));

        event.set();
        event.set();
        assert!(event.wait_for(Duration::from_millis(1)));
        assert!(!event.wait_for(Duration::from_millis(1)));
    }

    #[test]
    fn event_wakes_other_thread() {
        let event = Arc::new(Event::new(false));
        let waiter = {
            let event = event.clone();
            std::thread::spawn(move || event.wait())
        };
        event.set();
        waiter.join().unwrap();
    }

    #[test]
    fn latency_waitable_counts_releases() {
        let waitable = FrameLatencyWaitable::new(2);
        assert!(waitable.wait(Some(Duration::ZERO)));
        assert!(waitable.wait(Some(Duration::ZERO)));
        assert!(!waitable.wait(Some(Duration::from_millis(1))));

        waitable.release();
        assert!(waitable.wait(Some(Duration::ZERO)));

        waitable.release();
        waitable.release();
        waitable.release();
        assert!(waitable.wait(None));
        assert!(waitable.wait(None));
        assert!(!waitable.wait(Some(Duration::from_millis(1))));
    }
}
