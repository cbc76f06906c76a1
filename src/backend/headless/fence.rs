use std::{
    fmt::{self, Debug},
    time::Duration,
};

use parking_lot::{Condvar, Mutex};

use crate::{backend::Fence, DeviceLost};

/// Timeline fence living on the host.
pub struct HeadlessFence {
    label: String,
    value: Mutex<u64>,
    cond: Condvar,
}

impl Debug for HeadlessFence {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if fmt.alternate() {
            fmt.debug_struct("HeadlessFence")
                .field("label", &self.label)
                .field("value", &*self.value.lock())
                .finish()
        } else {
            write!(fmt, "{}({})", self.label, *self.value.lock())
        }
    }
}

impl HeadlessFence {
    pub fn new(label: &str, initial: u64) -> Self {
        HeadlessFence {
            label: label.to_owned(),
            value: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }
}

impl Fence for HeadlessFence {
    fn label(&self) -> &str {
        &self.label
    }

    fn completed_value(&self) -> u64 {
        *self.value.lock()
    }

    fn signal(&self, value: u64) -> Result<(), DeviceLost> {
        let mut current = self.value.lock();
        if value > *current {
            *current = value;
            self.cond.notify_all();
        }
        Ok(())
    }

    fn wait_blocking(&self, value: u64, timeout: Duration) -> bool {
        let mut current = self.value.lock();
        if *current < value {
            let _ = self
                .cond
                .wait_while_for(&mut current, |current| *current < value, timeout);
        }
        *current >= value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn signal_is_monotonic() {
        let fence = HeadlessFence::new("fence", 3);
        fence.signal(10).unwrap();
        fence.signal(4).unwrap();
        assert_eq!(fence.completed_value(), 10);
        assert!(fence.wait_blocking(10, Duration::ZERO));
        assert!(!fence.wait_blocking(11, Duration::from_millis(1)));
    }

    #[test]
    fn wakes_blocked_waiter() {
        let fence = Arc::new(HeadlessFence::new("fence", 0));
        let waiter = {
            let fence = fence.clone();
            std::thread::spawn(move || fence.wait_blocking(2, Duration::from_secs(10)))
        };
        fence.signal(1).unwrap();
        fence.signal(2).unwrap();
        assert!(waiter.join().unwrap());
    }
}
