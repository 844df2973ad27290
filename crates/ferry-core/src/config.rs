//! Queue configuration

use crate::error::{QueueError, Result};
use rand::Rng;
use std::time::Duration;

/// Default maximum number of entries in a batch
pub const DEFAULT_CAPACITY: usize = 10;

/// Default progress step per tick (percentage points)
pub const DEFAULT_STEP: u8 = 20;

/// Default simulator tick interval
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(300);

/// Default pause after a completion before the next transition
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Default broadcast buffer for queue events
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Upload queue configuration
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Maximum entries (pending, transferring and completed) held at once
    pub capacity: usize,

    /// How far one tick advances a file
    pub step: StepPolicy,

    /// Time between simulator ticks
    pub tick_interval: Duration,

    /// Pause after a file completes, and after the last file before going idle
    pub settle_delay: Duration,

    /// Broadcast channel depth for lifecycle events
    pub event_buffer: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            step: StepPolicy::Fixed(DEFAULT_STEP),
            tick_interval: DEFAULT_TICK_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl QueueConfig {
    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] for a zero capacity, a zero tick
    /// interval, an empty event buffer, or an invalid step policy.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(QueueError::invalid_config("capacity must be at least 1"));
        }
        if self.tick_interval.is_zero() {
            return Err(QueueError::invalid_config(
                "tick interval must be greater than zero",
            ));
        }
        if self.event_buffer == 0 {
            return Err(QueueError::invalid_config("event buffer must be at least 1"));
        }
        self.step.validate()
    }
}

/// Progress increment applied on each simulator tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Constant step
    Fixed(u8),
    /// Uniform random step in `min..=max`
    Random {
        /// Smallest step
        min: u8,
        /// Largest step
        max: u8,
    },
}

impl StepPolicy {
    /// Validate step bounds
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] if a step could be zero, exceed 100,
    /// or if `min > max`.
    pub fn validate(&self) -> Result<()> {
        match *self {
            StepPolicy::Fixed(step) => {
                if step == 0 || step > 100 {
                    return Err(QueueError::invalid_config("step must be in 1..=100"));
                }
            }
            StepPolicy::Random { min, max } => {
                if min == 0 || max > 100 {
                    return Err(QueueError::invalid_config(
                        "random step bounds must be in 1..=100",
                    ));
                }
                if min > max {
                    return Err(QueueError::invalid_config(
                        "random step minimum exceeds maximum",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Apply one step to `current`, saturating at 100
    pub fn advance<R: Rng + ?Sized>(&self, current: u8, rng: &mut R) -> u8 {
        let step = match *self {
            StepPolicy::Fixed(step) => step,
            StepPolicy::Random { min, max } => rng.gen_range(min..=max),
        };
        current.saturating_add(step).min(100)
    }
}
