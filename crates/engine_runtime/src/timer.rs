//! Timer hook bookkeeping.
//!
//! Every timer hook gets its own [`TimerState`] per node instance. Wall-clock
//! timers accumulate elapsed seconds as `f64` and subtract the period on each
//! firing, so the remainder carries into the next frame. Deltas are never
//! rounded to whole nanoseconds, which would lose time every frame.

use std::time::Duration;

/// Slack for a threshold crossing, absorbing the error of summing decimal
/// deltas such as ten steps of `0.1`.
const THRESHOLD_EPSILON: f64 = 1e-9;

/// How often a timer hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerInterval {
    /// Every N logic frames. Zero is treated as one.
    Frames(u32),
    /// Every period of scaled frame time. A zero period fires every frame.
    Seconds(Duration),
}

impl TimerInterval {
    /// A wall-clock interval from seconds. Negative or non-finite values
    /// become a zero period.
    #[must_use]
    pub fn seconds(seconds: f64) -> Self {
        Self::Seconds(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO))
    }
}

/// Per-instance progress towards the next firing.
#[derive(Debug, Clone)]
pub struct TimerState {
    interval: TimerInterval,
    frames: u32,
    elapsed: f64,
}

impl TimerState {
    /// A timer that has not accumulated anything.
    #[must_use]
    pub fn new(interval: TimerInterval) -> Self {
        Self {
            interval,
            frames: 0,
            elapsed: 0.0,
        }
    }

    /// The configured interval.
    #[must_use]
    pub fn interval(&self) -> TimerInterval {
        self.interval
    }

    /// Account for one frame of `dt` seconds and return how many times the
    /// timer fires.
    pub fn advance(&mut self, dt: f64) -> u32 {
        match self.interval {
            TimerInterval::Frames(every) => {
                self.frames += 1;
                if self.frames >= every.max(1) {
                    self.frames = 0;
                    1
                } else {
                    0
                }
            }
            TimerInterval::Seconds(period) => {
                if period.is_zero() {
                    return 1;
                }
                if dt.is_finite() && dt > 0.0 {
                    self.elapsed += dt;
                }
                let period = period.as_secs_f64();
                let mut fired = 0;
                while self.elapsed + THRESHOLD_EPSILON >= period {
                    self.elapsed -= period;
                    fired += 1;
                }
                fired
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(interval: TimerInterval, deltas: &[f64]) -> u32 {
        let mut timer = TimerState::new(interval);
        deltas.iter().map(|&dt| timer.advance(dt)).sum()
    }

    #[test]
    fn test_seconds_timer_survives_small_steps() {
        assert_eq!(total(TimerInterval::seconds(1.0), &[0.1; 10]), 1);
        assert_eq!(total(TimerInterval::seconds(1.0), &[0.5, 0.5]), 1);
        assert_eq!(total(TimerInterval::seconds(1.0), &[0.5]), 0);
    }

    #[test]
    fn test_seconds_timer_fires_on_time_at_common_rates() {
        for rate in [3.0, 30.0, 60.0, 144.0] {
            let steps = rate as usize;
            let mut timer = TimerState::new(TimerInterval::seconds(1.0));
            let fired: u32 = (0..steps - 1).map(|_| timer.advance(1.0 / rate)).sum();
            assert_eq!(fired, 0, "{rate} Hz fired early");
            assert_eq!(timer.advance(1.0 / rate), 1, "{rate} Hz missed the first second");
        }
    }

    #[test]
    fn test_seconds_timer_does_not_drift() {
        let mut timer = TimerState::new(TimerInterval::seconds(1.0));
        let fired: u32 = (0..30 * 600).map(|_| timer.advance(1.0 / 30.0)).sum();
        assert_eq!(fired, 600);

        let mut timer = TimerState::new(TimerInterval::seconds(0.25));
        let deltas = [1.0 / 60.0, 1.0 / 30.0, 1.0 / 144.0, 0.1];
        let mut elapsed = 0.0;
        let mut fired = 0;
        for i in 0..4000 {
            let dt = deltas[i % deltas.len()];
            elapsed += dt;
            fired += timer.advance(dt);
        }
        assert_eq!(fired, (elapsed / 0.25 + 1e-9).floor() as u32);
    }

    #[test]
    fn test_seconds_timer_keeps_remainder() {
        let mut timer = TimerState::new(TimerInterval::seconds(1.0));
        assert_eq!(timer.advance(0.75), 0);
        assert_eq!(timer.advance(0.75), 1);
        assert_eq!(timer.advance(0.5), 1);
        assert_eq!(timer.advance(2.0), 2);
    }

    #[test]
    fn test_frame_timer() {
        assert_eq!(total(TimerInterval::Frames(3), &[0.016; 9]), 3);
        assert_eq!(total(TimerInterval::Frames(0), &[0.016; 4]), 4);
    }

    #[test]
    fn test_degenerate_intervals() {
        assert_eq!(total(TimerInterval::seconds(0.0), &[0.0, 0.0]), 2);
        assert_eq!(total(TimerInterval::seconds(-1.0), &[0.1]), 1);
        let mut timer = TimerState::new(TimerInterval::seconds(1.0));
        assert_eq!(timer.advance(-5.0), 0);
    }
}
