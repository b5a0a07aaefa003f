use web_time::{Duration, Instant};

/// Wall-clock stopwatch for timing host-side work such as an update or
/// draw pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuClock {
    start: Option<Instant>,
    elapsed: Option<Duration>,
}

impl CpuClock {
    /// A clock that has not been started.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a measurement, discarding the previous result.
    pub fn start(&mut self) {
        self.start = Some(Instant::now());
        self.elapsed = None;
    }

    /// End the measurement. No-op when not started.
    pub fn stop(&mut self) {
        if let Some(start) = self.start.take() {
            self.elapsed = Some(start.elapsed());
        }
    }

    /// Whether a completed measurement is available.
    #[must_use]
    pub fn time_available(&self) -> bool {
        self.elapsed.is_some()
    }

    /// Seconds between the last `start` and `stop`.
    #[must_use]
    pub fn elapsed_seconds(&self) -> Option<f64> {
        self.elapsed.map(|elapsed| elapsed.as_secs_f64())
    }
}
