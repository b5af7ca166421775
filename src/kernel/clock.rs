// src/kernel/clock.rs
//! Logical clock
//!
//! Time in the simulation is a monotonically increasing integer tick counter
//! with no relation to wall-clock time. The clock only ever moves forward;
//! asking it to move backwards is a programming-contract violation, not a
//! domain failure.

use crate::utils::errors::{EngineError, Result};

/// Logical simulation time, measured in ticks
pub type Tick = u64;

/// Monotonic logical clock
#[derive(Debug, Default)]
pub struct Clock {
    now: Tick,
}

impl Clock {
    /// Create a clock at tick zero
    pub fn new() -> Self {
        Self { now: 0 }
    }

    /// Current logical time
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Advance the clock to an absolute time
    ///
    /// Fails with `TimeRegression` if `time` is earlier than the current
    /// time. Advancing to the current time is a no-op.
    pub fn advance_to(&mut self, time: Tick) -> Result<()> {
        if time < self.now {
            return Err(EngineError::TimeRegression {
                now: self.now,
                requested: time,
            });
        }
        self.now = time;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        assert_eq!(Clock::new().now(), 0);
    }

    #[test]
    fn test_advance_forward() {
        let mut clock = Clock::new();
        clock.advance_to(5).unwrap();
        clock.advance_to(5).unwrap();
        clock.advance_to(17).unwrap();
        assert_eq!(clock.now(), 17);
    }

    #[test]
    fn test_advance_backwards_rejected() {
        let mut clock = Clock::new();
        clock.advance_to(10).unwrap();

        let err = clock.advance_to(3).unwrap_err();
        assert!(matches!(
            err,
            EngineError::TimeRegression {
                now: 10,
                requested: 3
            }
        ));
        // Failed advance leaves the clock untouched
        assert_eq!(clock.now(), 10);
    }
}
