//! Clock abstractions driving time predicates and delayed events
//!
//! An interpreter samples its clock exactly once per `execute_once` call, at
//! the very beginning; the sampled value becomes the step's `time`. Every
//! time predicate (`after`, `idle`) and every delayed-event release check
//! inside that step uses the sampled value, so a macro step observes a single
//! consistent instant.
//!
//! Three clock variants are provided:
//!
//! - [`SimulatedClock`] - manually advanced, optionally bound to real time
//!   with a speed factor. The default for tests and discrete simulation.
//! - [`UtcClock`] - wall clock, UTC seconds since the Unix epoch.
//! - [`SynchronizedClock`] - mirrors another interpreter's last-step time,
//!   for charts that must observe a sibling's notion of "now".
//!
//! # Examples
//!
//! ```rust
//! use statecharts_core::clock::{Clock, SimulatedClock};
//!
//! let mut clock = SimulatedClock::new();
//! assert_eq!(clock.time(), 0.0);
//!
//! clock.set_time(42.0).unwrap();
//! assert_eq!(clock.time(), 42.0);
//!
//! // Rewinding is forbidden: time is monotonic non-decreasing.
//! assert!(clock.set_time(10.0).is_err());
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use crate::error::{Result, StatechartError};

/// A monotonic, non-decreasing time source, in seconds.
///
/// Implementations are free to choose their epoch; only differences and
/// ordering matter to the interpreter.
pub trait Clock {
    /// Current time, in seconds. Must be non-decreasing across calls.
    fn time(&self) -> f64;
}

/// Shared read-only handle on an interpreter's last-step time.
///
/// Cloned handles observe the same cell; the owning interpreter updates it
/// at the start of every macro step. Used by [`SynchronizedClock`].
#[derive(Debug, Clone, Default)]
pub struct TimeHandle(Rc<Cell<f64>>);

impl TimeHandle {
    pub(crate) fn new() -> Self {
        Self(Rc::new(Cell::new(0.0)))
    }

    pub(crate) fn set(&self, time: f64) {
        self.0.set(time);
    }

    /// The last time written to this handle.
    pub fn get(&self) -> f64 {
        self.0.get()
    }
}

/// A manually driven clock, the default for discrete simulation.
///
/// Time starts at 0 and only moves when [`set_time`](Self::set_time) is
/// called, or, while [`start`](Self::start)ed, with real elapsed seconds
/// scaled by a [`speed`](Self::set_speed) factor added to the manual
/// baseline. Writing a strictly smaller time is rejected.
///
/// # Examples
///
/// ```rust
/// use statecharts_core::clock::{Clock, SimulatedClock};
///
/// let mut clock = SimulatedClock::new();
/// clock.set_time(5.0).unwrap();
///
/// // Run at 100x real time until stop() is called.
/// clock.set_speed(100.0);
/// clock.start();
/// assert!(clock.time() >= 5.0);
/// clock.stop();
/// ```
#[derive(Debug)]
pub struct SimulatedClock {
    base: f64,
    speed: f64,
    started_at: Option<Instant>,
}

impl SimulatedClock {
    /// Create a stopped clock reading 0.
    pub fn new() -> Self {
        Self { base: 0.0, speed: 1.0, started_at: None }
    }

    /// Set the current time.
    ///
    /// While the clock is running, the new value becomes the baseline for
    /// subsequent elapsed-time accumulation.
    ///
    /// # Errors
    ///
    /// Returns [`StatechartError::Clock`] if `time` is strictly smaller than
    /// the current reading.
    pub fn set_time(&mut self, time: f64) -> Result<()> {
        let current = self.time();
        if time < current {
            return Err(StatechartError::Clock(format!(
                "cannot move time backwards from {} to {}",
                current, time
            )));
        }
        self.base = time;
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
        Ok(())
    }

    /// Scale factor applied to real elapsed seconds while running.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Change the speed factor. Accumulated time so far is folded into the
    /// baseline first, so past readings are unaffected.
    pub fn set_speed(&mut self, speed: f64) {
        self.base = self.time();
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
        self.speed = speed;
    }

    /// Start accumulating real elapsed time (scaled by `speed`) onto the
    /// baseline. No-op if already running.
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Stop accumulating; the reading freezes at its current value.
    pub fn stop(&mut self) {
        self.base = self.time();
        self.started_at = None;
    }

    /// Whether the clock is currently bound to real time.
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimulatedClock {
    fn time(&self) -> f64 {
        match self.started_at {
            Some(started) => self.base + started.elapsed().as_secs_f64() * self.speed,
            None => self.base,
        }
    }
}

/// Wall clock: UTC seconds since the Unix epoch, not writable.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcClock;

impl UtcClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for UtcClock {
    fn time(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// Read-only clock mirroring another interpreter's last-step time.
///
/// Built from the other interpreter's
/// [`time_handle`](crate::Interpreter::time_handle). The reading advances
/// only when the observed interpreter executes a step, which keeps a chart
/// synchronized with the sibling driving it.
#[derive(Debug, Clone)]
pub struct SynchronizedClock {
    handle: TimeHandle,
}

impl SynchronizedClock {
    /// Mirror the time seen through `handle`.
    pub fn new(handle: TimeHandle) -> Self {
        Self { handle }
    }
}

impl Clock for SynchronizedClock {
    fn time(&self) -> f64 {
        self.handle.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_clock_starts_at_zero() {
        let clock = SimulatedClock::new();
        assert_eq!(clock.time(), 0.0);
    }

    #[test]
    fn test_simulated_clock_advances() {
        let mut clock = SimulatedClock::new();
        clock.set_time(10.0).unwrap();
        assert_eq!(clock.time(), 10.0);
        clock.set_time(10.0).unwrap();
        assert_eq!(clock.time(), 10.0);
    }

    #[test]
    fn test_simulated_clock_rejects_rewind() {
        let mut clock = SimulatedClock::new();
        clock.set_time(10.0).unwrap();
        let err = clock.set_time(9.0).unwrap_err();
        assert!(matches!(err, StatechartError::Clock(_)));
        assert_eq!(clock.time(), 10.0);
    }

    #[test]
    fn test_simulated_clock_start_stop() {
        let mut clock = SimulatedClock::new();
        clock.set_time(5.0).unwrap();
        clock.start();
        assert!(clock.is_running());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.time() >= 5.0);
        clock.stop();
        let frozen = clock.time();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(clock.time(), frozen);
    }

    #[test]
    fn test_simulated_clock_speed_scales_elapsed() {
        let mut clock = SimulatedClock::new();
        clock.set_speed(100.0);
        clock.start();
        std::thread::sleep(std::time::Duration::from_millis(20));
        // 20ms of real time at 100x is at least one simulated second.
        assert!(clock.time() >= 1.0);
    }

    #[test]
    fn test_utc_clock_is_recent() {
        // 2021-01-01 in epoch seconds; any correct wall clock is later.
        assert!(UtcClock::new().time() > 1_609_459_200.0);
    }

    #[test]
    fn test_synchronized_clock_follows_handle() {
        let handle = TimeHandle::new();
        let clock = SynchronizedClock::new(handle.clone());
        assert_eq!(clock.time(), 0.0);
        handle.set(12.5);
        assert_eq!(clock.time(), 12.5);
    }
}
