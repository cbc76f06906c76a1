use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::backend::Fence;

/// Interval between wait callback invocations and blocking wait slices.
pub const WAIT_CALLBACK_INTERVAL: Duration = Duration::from_millis(1);

/// Describes a fence wait in progress.
#[derive(Clone, Copy, Debug)]
pub struct FenceWaitInfo<'a> {
    /// Label of the fence.
    pub fence: &'a str,

    /// Value the thread waits for, not the current one.
    pub value: u64,

    /// Time spent waiting so far.
    pub elapsed: Duration,
}

/// Hook invoked periodically while a thread is stuck on a fence.
/// Useful for hang diagnostics and watchdogs.
#[derive(Clone)]
pub struct WaitCallback(Arc<dyn Fn(&FenceWaitInfo<'_>) + Send + Sync>);

impl fmt::Debug for WaitCallback {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "WaitCallback({:p})", Arc::as_ptr(&self.0))
    }
}

impl WaitCallback {
    pub fn new(f: impl Fn(&FenceWaitInfo<'_>) + Send + Sync + 'static) -> Self {
        WaitCallback(Arc::new(f))
    }

    pub fn call(&self, info: &FenceWaitInfo<'_>) {
        (self.0)(info)
    }
}

/// Waits until `fence` reaches `value`.
///
/// `timeout` of `None` waits forever, the caller must guarantee the value gets signalled.
/// With `blocking` the thread parks on the fence in short slices, otherwise it polls.
/// Either way `callback` runs at most once per [`WAIT_CALLBACK_INTERVAL`].
///
/// Returns `false` if the timeout elapsed.
pub fn wait_for_fence_value(
    fence: &dyn Fence,
    value: u64,
    timeout: Option<Duration>,
    callback: Option<&WaitCallback>,
    blocking: bool,
) -> bool {
    if fence.completed_value() >= value {
        return true;
    }

    let start = Instant::now();
    let mut last_callback = start;

    loop {
        if blocking {
            let slice = match timeout {
                Some(timeout) => WAIT_CALLBACK_INTERVAL.min(timeout.saturating_sub(start.elapsed())),
                None => WAIT_CALLBACK_INTERVAL,
            };
            if fence.wait_blocking(value, slice) {
                return true;
            }
        } else if fence.completed_value() >= value {
            return true;
        } else {
            std::thread::yield_now();
        }

        let now = Instant::now();
        let elapsed = now - start;

        if let Some(timeout) = timeout {
            if elapsed >= timeout {
                return fence.completed_value() >= value;
            }
        }

        if let Some(callback) = callback {
            if now - last_callback > WAIT_CALLBACK_INTERVAL {
                last_callback = now;
                callback.call(&FenceWaitInfo {
                    fence: fence.label(),
                    value,
                    elapsed,
                });
            }
        }
    }
}
