//! Host tick loop.
//!
//! Each tick asks the clock for a delta and hands it to
//! [`ReloadHost::process_frame`], which applies pending reloads before the
//! logic frame runs.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::clock::{FixedClock, FrameClock};
use crate::error::HostError;
use crate::reload::ReloadHost;

/// Configuration for the host tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    fn budget(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.tick_rate).unwrap_or(Duration::ZERO)
    }
}

/// Drives a [`ReloadHost`] at a fixed rate.
pub struct TickLoop {
    tick_id: u64,
    config: TickConfig,
    host: ReloadHost,
    clock: Box<dyn FrameClock>,
}

impl TickLoop {
    /// Create a loop whose clock reports exactly one tick budget per frame.
    #[must_use]
    pub fn new(config: TickConfig, host: ReloadHost) -> Self {
        let dt = config.budget().as_secs_f64();
        Self::with_clock(config, host, Box::new(FixedClock(dt)))
    }

    /// Create a loop with a custom clock.
    #[must_use]
    pub fn with_clock(config: TickConfig, host: ReloadHost, clock: Box<dyn FrameClock>) -> Self {
        Self {
            tick_id: 0,
            config,
            host,
            clock,
        }
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns a reference to the host.
    #[must_use]
    pub fn host(&self) -> &ReloadHost {
        &self.host
    }

    /// Returns a mutable reference to the host.
    pub fn host_mut(&mut self) -> &mut ReloadHost {
        &mut self.host
    }

    /// Consume the loop and return the host.
    #[must_use]
    pub fn into_host(self) -> ReloadHost {
        self.host
    }

    /// Run one tick.
    pub fn tick(&mut self) -> Result<(), HostError> {
        self.tick_id += 1;
        let dt = self.clock.next_delta();
        let report = self.host.process_frame(dt)?;
        debug!(
            tick_id = self.tick_id,
            dt,
            updated = report.updated,
            freed = report.freed,
            hook_failures = report.hook_failures,
            "tick complete"
        );
        Ok(())
    }

    /// Run for the configured number of ticks, or until a tick fails.
    ///
    /// Sleeps on the tokio timer between ticks, so it must be awaited inside
    /// a runtime.
    pub async fn run(&mut self) -> Result<(), HostError> {
        let tick_duration = self.config.budget();
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();

            if let Err(err) = self.tick() {
                error!(tick_id = self.tick_id, error = %err, "tick failed");
                return Err(err);
            }

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                tokio::time::sleep(tick_duration - elapsed).await;
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }
}
