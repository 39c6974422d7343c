//! Fixed-rate tick loop.
//!
//! Drives a [`Session`] at a fixed timestep. Before every tick a script
//! callback gets the session and the tick number and returns that tick's
//! input; demos and tests use it to press buttons, move avatars or pump an
//! in-process arbiter.

use std::time::{Duration, Instant};

use handoff_net::Broadcast;
use tracing::{debug, info, warn};

use crate::session::{Session, TickInput, TickReport};

/// Configuration for the tick loop.
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
    /// Stop after `max_ticks` ticks.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Run at `tick_rate` ticks per second.
    #[must_use]
    pub fn with_tick_rate(mut self, tick_rate: f64) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    /// The fixed timestep. Rates that are not finite and positive fall back
    /// to 60 Hz.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        let rate = if self.tick_rate.is_finite() && self.tick_rate > 0.0 {
            self.tick_rate
        } else {
            60.0
        };
        Duration::from_secs_f64(1.0 / rate)
    }
}

/// The tick loop state.
#[derive(Debug)]
pub struct TickLoop {
    /// Current tick counter.
    tick_id: u64,
    /// Tick configuration.
    config: TickConfig,
}

impl TickLoop {
    /// Create a new tick loop with the given configuration.
    #[must_use]
    pub fn new(config: TickConfig) -> Self {
        Self { tick_id: 0, config }
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    /// Run one tick: ask the script for input, then tick the session.
    pub fn step<B, F>(&mut self, session: &mut Session<B>, script: &mut F) -> TickReport
    where
        B: Broadcast,
        F: FnMut(&mut Session<B>, u64) -> TickInput,
    {
        self.tick_id += 1;
        let input = script(session, self.tick_id);
        let dt = self.config.tick_duration().as_secs_f32();
        let report = session.tick(dt, &input);
        if report.errors > 0 {
            debug!(tick_id = self.tick_id, errors = report.errors, "tick had errors");
        }
        report
    }

    fn finished(&self) -> bool {
        self.config.max_ticks > 0 && self.tick_id >= self.config.max_ticks
    }

    /// Run the loop for the configured number of ticks, or indefinitely,
    /// sleeping the thread between ticks.
    pub fn run<B, F>(&mut self, session: &mut Session<B>, mut script: F) -> u64
    where
        B: Broadcast,
        F: FnMut(&mut Session<B>, u64) -> TickInput,
    {
        let tick_duration = self.config.tick_duration();
        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();
            self.step(session, &mut script);
            if self.finished() {
                info!(ticks = self.tick_id, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
        self.tick_id
    }

    /// Run the loop on a tokio interval. Late ticks are skipped, not bunched.
    pub async fn run_async<B, F>(&mut self, session: &mut Session<B>, mut script: F) -> u64
    where
        B: Broadcast,
        F: FnMut(&mut Session<B>, u64) -> TickInput,
    {
        let mut interval = tokio::time::interval(self.config.tick_duration());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting async tick loop"
        );

        loop {
            interval.tick().await;
            self.step(session, &mut script);
            if self.finished() {
                info!(ticks = self.tick_id, "tick loop complete");
                break;
            }
        }
        self.tick_id
    }
}
