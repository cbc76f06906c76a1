/// Number of deltas the estimator averages over.
pub const ESTIMATOR_WINDOW: usize = 10;

/// Moving average and standard deviation of recent frame deltas.
///
/// Both statistics report zero until the window has been filled once,
/// so a handful of early samples never produces a skewed estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTimeEstimator {
    samples: [f64; ESTIMATOR_WINDOW],
    cursor: usize,
    seen: usize,
}

impl Default for FrameTimeEstimator {
    fn default() -> Self {
        FrameTimeEstimator::new()
    }
}

impl FrameTimeEstimator {
    pub const fn new() -> Self {
        FrameTimeEstimator {
            samples: [0.0; ESTIMATOR_WINDOW],
            cursor: 0,
            seen: 0,
        }
    }

    /// Pushes new delta overwriting the oldest one.
    pub fn update(&mut self, delta: f64) {
        self.samples[self.cursor] = delta;
        self.cursor = (self.cursor + 1) % ESTIMATOR_WINDOW;
        self.seen = self.seen.saturating_add(1);
    }

    /// Whether enough samples were seen for non-zero estimates.
    pub fn is_warm(&self) -> bool {
        self.seen >= ESTIMATOR_WINDOW
    }

    pub fn average(&self) -> f64 {
        if !self.is_warm() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / ESTIMATOR_WINDOW as f64
    }

    /// Population standard deviation of the window.
    ///
    /// Deviation rather than squared variance is returned
    /// as it is combined linearly with the average.
    pub fn variance(&self) -> f64 {
        if !self.is_warm() {
            return 0.0;
        }
        let average = self.average();
        let squares = self
            .samples
            .iter()
            .map(|sample| (sample - average) * (sample - average))
            .sum::<f64>();
        (squares / ESTIMATOR_WINDOW as f64).sqrt()
    }

    /// Discards history.
    pub fn reset(&mut self) {
        self.seen = 0;
        self.cursor = 0;
    }
}
