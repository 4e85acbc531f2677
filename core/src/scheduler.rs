//! Fixed-step scheduling
//!
//! One cooperative fixed-timestep loop drives everything; there is no
//! parallel execution of simulation ticks. The scheduler turns real elapsed
//! time into a number of due ticks via a delta accumulator, clamps runaway
//! deltas, and tracks consecutive simulation faults: after
//! [`MAX_CONSECUTIVE_FAULTS`] it suspends rather than retrying forever
//! against possibly-corrupted state.

use std::time::{Duration, Instant};

/// Consecutive simulation-step faults tolerated before the scheduler is put
/// to sleep. Fatal for the session; not auto-recovered.
pub const MAX_CONSECUTIVE_FAULTS: u32 = 100;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Target tick rate in Hz
    pub tick_rate: u32,
    /// Maximum delta time clamp (prevents spiral of death)
    pub max_delta: Duration,
    /// CPU budget warning threshold per tick
    pub cpu_budget: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            max_delta: Duration::from_millis(100),
            cpu_budget: Duration::from_micros(4000),
        }
    }
}

/// Fixed-step tick pacing with a delta-time accumulator.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    tick_duration: Duration,
    accumulator: Duration,
    last_update: Option<Instant>,
    consecutive_faults: u32,
    suspended: bool,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate as f64);
        Self {
            config,
            tick_duration,
            accumulator: Duration::ZERO,
            last_update: None,
            consecutive_faults: 0,
            suspended: false,
        }
    }

    /// Seconds per tick as passed to the simulation step.
    pub fn dt(&self) -> f32 {
        self.tick_duration.as_secs_f32()
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Consume elapsed real time and return the number of due ticks.
    ///
    /// Returns 0 while suspended.
    pub fn due_ticks(&mut self, now: Instant) -> u32 {
        if self.suspended {
            return 0;
        }

        let delta = match self.last_update {
            Some(last) => (now - last).min(self.config.max_delta),
            None => self.tick_duration,
        };
        self.last_update = Some(now);
        self.accumulator += delta;

        let mut ticks = 0u32;
        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            ticks += 1;
        }
        ticks
    }

    /// Reset the delta accumulator.
    ///
    /// Called after any synchronous free-run (preflight, time-sight) and
    /// after stopping one mid-flight, so the banked real time does not land
    /// as a burst of catch-up ticks - the user would see a time jump.
    pub fn reset_accumulator(&mut self) {
        self.accumulator = Duration::ZERO;
        self.last_update = None;
    }

    /// Warn when a tick blew its CPU budget.
    pub fn check_budget(&self, tick_time: Duration) {
        if tick_time > self.config.cpu_budget {
            tracing::warn!(
                "tick took {:?}, exceeds budget of {:?}",
                tick_time,
                self.config.cpu_budget
            );
        }
    }

    /// Record a simulation-step fault. Returns true exactly once, on the
    /// call that exhausts the fault budget and suspends the scheduler.
    pub fn record_fault(&mut self) -> bool {
        self.consecutive_faults += 1;
        if self.suspended {
            return false;
        }
        if self.consecutive_faults >= MAX_CONSECUTIVE_FAULTS {
            self.suspended = true;
            tracing::error!(
                faults = self.consecutive_faults,
                "simulation step failing persistently; scheduler suspended"
            );
            return true;
        }
        false
    }

    /// Record a successful simulation step, clearing the fault streak.
    pub fn record_success(&mut self) {
        self.consecutive_faults = 0;
    }

    pub fn consecutive_faults(&self) -> u32 {
        self.consecutive_faults
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}
