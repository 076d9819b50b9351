//! Frame time sources.

use std::time::Instant;

/// Supplies the delta for each frame.
pub trait FrameClock: Send {
    /// Seconds since the previous call.
    fn next_delta(&mut self) -> f64;
}

/// Always reports the same delta. Used for deterministic runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub f64);

impl FrameClock for FixedClock {
    fn next_delta(&mut self) -> f64 {
        self.0
    }
}

/// Measures real elapsed time. The first delta is measured from creation.
#[derive(Debug)]
pub struct WallClock {
    last: Instant,
}

impl WallClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock for WallClock {
    fn next_delta(&mut self) -> f64 {
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        dt
    }
}
