use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Ticks of the performance counter per second.
pub const PERFORMANCE_FREQUENCY: u64 = 1_000_000_000;

/// Granularity of `thread::sleep` assumed when the platform does not report one.
pub const DEFAULT_TIMER_RESOLUTION: Duration = Duration::from_millis(1);

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Reads the high-resolution monotonic counter.
///
/// Ticks are counted from the first call in the process,
/// so the value is never zero once any timing took place.
pub fn performance_counter() -> u64 {
    let elapsed = EPOCH.elapsed();
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

/// Converts milliseconds into performance counter ticks.
pub fn ms_to_ticks(ms: f64, frequency: u64) -> u64 {
    if ms <= 0.0 {
        return 0;
    }
    (ms * frequency as f64 / 1000.0) as u64
}

/// Converts performance counter ticks into a duration.
pub fn ticks_to_duration(ticks: u64, frequency: u64) -> Duration {
    let nanos = u128::from(ticks) * 1_000_000_000 / u128::from(frequency.max(1));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Waits until the performance counter reaches `target`.
///
/// Sleeps in `timer_resolution` slices while more than
/// `spin_budget * timer_resolution` remains, then spins for the rest.
/// Zero budget is treated as one slice, sleeping cannot overshoot by more than that.
pub fn wait_for_performance_count(
    target: u64,
    frequency: u64,
    timer_resolution: Duration,
    spin_budget: u32,
) {
    let resolution_ticks = u64::try_from(
        u128::from(frequency) * timer_resolution.as_nanos() / 1_000_000_000,
    )
    .unwrap_or(u64::MAX)
    .max(1);

    let sleep_threshold = resolution_ticks.saturating_mul(u64::from(spin_budget.max(1)));

    loop {
        let now = performance_counter();
        if now >= target {
            return;
        }

        let remaining = target - now;
        if remaining > sleep_threshold {
            std::thread::sleep(timer_resolution);
        } else {
            break;
        }
    }

    while performance_counter() < target {
        std::hint::spin_loop();
    }
}

/// Spins until the performance counter reaches `target` without ever sleeping.
pub fn spin_until_performance_count(target: u64) {
    while performance_counter() < target {
        std::hint::spin_loop();
    }
}
