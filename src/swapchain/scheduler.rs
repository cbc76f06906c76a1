use std::sync::{atomic::Ordering, Arc};

use crate::{
    clock::{ms_to_ticks, performance_counter, PERFORMANCE_FREQUENCY},
    config::FramePacingTuning,
    estimator::FrameTimeEstimator,
    pacing::{present_delay, FrameKind, PacingData, BLOCKING_WAIT_THRESHOLD_MS, RESET_THRESHOLD_MS},
};

use super::PresentInfo;

/// Frame time tracking of the scheduler.
///
/// Time is passed in explicitly as performance counter ticks.
#[derive(Debug)]
struct FramePacer {
    estimator: FrameTimeEstimator,
    previous_update: u64,
    previous_delta: u64,
    reset_threshold: u64,
    blocking_threshold: u64,
}

impl FramePacer {
    fn new(now: u64) -> Self {
        FramePacer {
            estimator: FrameTimeEstimator::new(),
            previous_update: now,
            previous_delta: 0,
            reset_threshold: ms_to_ticks(RESET_THRESHOLD_MS, PERFORMANCE_FREQUENCY),
            blocking_threshold: ms_to_ticks(BLOCKING_WAIT_THRESHOLD_MS, PERFORMANCE_FREQUENCY),
        }
    }

    /// Whether the interpolation fence may be waited on by parking the thread.
    /// Polling is used when the next present is due soon.
    fn blocking_wait(&self, tuning: &FramePacingTuning, previous_present_qpc: u64, now: u64) -> bool {
        let ideal_present = previous_present_qpc + self.previous_delta;
        tuning.allow_blocking_fence_wait && ideal_present.saturating_sub(now) > self.blocking_threshold
    }

    /// Accounts interpolation completed at `now` and writes
    /// the resulting present delay into every slot of `window`.
    fn pace(&mut self, window: &mut PacingData, now: u64) -> u64 {
        let delta = now.saturating_sub(self.previous_update);
        self.previous_update = now;

        if window.reset || delta > self.reset_threshold {
            trace!("Frame time history reset, delta {} ticks", delta);
            self.estimator.reset();
        } else {
            self.estimator.update(delta as f64);
        }

        let margin = ms_to_ticks(f64::from(window.tuning.safety_margin_ms), PERFORMANCE_FREQUENCY);
        let delay = present_delay(
            self.estimator.average(),
            self.estimator.variance(),
            f64::from(window.tuning.variance_factor),
            margin,
        );

        for kind in FrameKind::ALL {
            window.frame_mut(kind).present_qpc_delta = delay;
        }
        self.previous_delta = delay;
        delay
    }
}

/// Interpolation scheduler loop.
///
/// Takes windows published by `present`, waits for their interpolation to complete,
/// computes present delays from the frame time estimate and hands windows to the presenter.
pub(super) fn run(info: Arc<PresentInfo>) {
    debug!("Interpolation scheduler started");

    let mut pacer = FramePacer::new(performance_counter());

    loop {
        info.interpolation_event.wait();
        if info.is_shutting_down() {
            break;
        }

        let mut window = match info.scheduled_interpolations.take() {
            Some(window) => window,
            None => continue,
        };

        let blocking = pacer.blocking_wait(
            &window.tuning,
            info.previous_present_qpc.load(Ordering::Acquire),
            performance_counter(),
        );

        let interpolation_value = FrameKind::ALL
            .iter()
            .map(|&kind| window.frame(kind).interpolation_completed_fence_value)
            .max()
            .unwrap_or(0);

        if !info.wait_fence(&*info.interpolation_fence, interpolation_value, blocking) {
            break;
        }

        // Let `present` dispatch the next interpolation as early as possible.
        info.pacer_event.set();

        pacer.pace(&mut window, performance_counter());

        if let Some(dropped) = info.scheduled_presents.publish(window) {
            debug!("Pacing window {:?} dropped before presentation", dropped);
        }
        info.present_event.set();
    }

    debug!("Interpolation scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(ms: f64) -> u64 {
        ms_to_ticks(ms, PERFORMANCE_FREQUENCY)
    }

    fn steady(pacer: &mut FramePacer, start: u64, frames: u64, frame_time: u64) -> (u64, PacingData) {
        let mut now = start;
        let mut window = PacingData::default();
        for _ in 0..frames {
            now += frame_time;
            window = PacingData::default();
            pacer.pace(&mut window, now);
        }
        (now, window)
    }

    #[test]
    fn steady_frames_delay_half_frame_time() {
        let mut pacer = FramePacer::new(0);
        let (_, window) = steady(&mut pacer, 0, 12, ms(16.0));

        // Zero deviation, only the safety margin is subtracted.
        let expected = ms(8.0) - ms(0.1);
        assert_eq!(window.frame(FrameKind::Interpolated).present_qpc_delta, expected);
        assert_eq!(window.frame(FrameKind::Real).present_qpc_delta, expected);
    }

    #[test]
    fn no_delay_until_history_fills() {
        let mut pacer = FramePacer::new(0);
        let (_, window) = steady(&mut pacer, 0, 9, ms(16.0));
        assert_eq!(window.frame(FrameKind::Real).present_qpc_delta, 0);
    }

    #[test]
    fn long_gap_resets_history() {
        let mut pacer = FramePacer::new(0);
        let (now, _) = steady(&mut pacer, 0, 12, ms(16.0));

        let mut window = PacingData::default();
        assert_eq!(pacer.pace(&mut window, now + ms(150.0)), 0);
        assert_eq!(window.frame(FrameKind::Interpolated).present_qpc_delta, 0);

        // History is rebuilt from scratch.
        let (_, window) = steady(&mut pacer, now + ms(150.0), 9, ms(16.0));
        assert_eq!(window.frame(FrameKind::Real).present_qpc_delta, 0);
        let (_, window) = steady(&mut pacer, now + ms(150.0) + 9 * ms(16.0), 1, ms(16.0));
        assert!(window.frame(FrameKind::Real).present_qpc_delta > 0);
    }

    #[test]
    fn gap_below_threshold_keeps_history() {
        let mut pacer = FramePacer::new(0);
        let (now, _) = steady(&mut pacer, 0, 12, ms(16.0));

        let mut window = PacingData::default();
        assert!(pacer.pace(&mut window, now + ms(90.0)) > 0);
    }

    #[test]
    fn window_reset_discards_history() {
        let mut pacer = FramePacer::new(0);
        let (now, _) = steady(&mut pacer, 0, 12, ms(16.0));

        let mut window = PacingData {
            reset: true,
            ..PacingData::default()
        };
        assert_eq!(pacer.pace(&mut window, now + ms(16.0)), 0);
        assert!(!pacer.estimator.is_warm());
    }

    #[test]
    fn blocking_wait_only_when_present_is_far() {
        let mut pacer = FramePacer::new(0);
        let (now, _) = steady(&mut pacer, 0, 12, ms(16.0));
        let delay = pacer.previous_delta;

        let allowed = FramePacingTuning {
            allow_blocking_fence_wait: true,
            ..FramePacingTuning::default()
        };

        // Previous present just happened, next one is a whole delay away.
        assert!(pacer.blocking_wait(&allowed, now, now));

        // Less than 2 ms left.
        assert!(!pacer.blocking_wait(&allowed, now, now + delay - ms(1.0)));

        // Next present is overdue.
        assert!(!pacer.blocking_wait(&allowed, now, now + delay + ms(1.0)));

        assert!(!pacer.blocking_wait(&FramePacingTuning::default(), now, now));
    }
}
