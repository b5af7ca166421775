// src/model/signal.rs
//! Workload-shaping signals
//!
//! A signal is a function from logical time to a number. Client stubs sample
//! one to decide how long to wait before their next emission, which is all
//! the engine needs to shape open-loop workloads (diurnal waves, noisy
//! plateaus, ramps).

use crate::kernel::clock::Tick;
use crate::utils::errors::{EngineError, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

/// A function from logical time to a number
pub trait Signal {
    fn value(&self, time: Tick) -> f64;
}

/// Always the same value
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub f64);

impl Signal for Constant {
    fn value(&self, _time: Tick) -> f64 {
        self.0
    }
}

/// A base signal with seeded uniform jitter in `[-amplitude, amplitude]`
pub struct Noisy<S: Signal> {
    base: S,
    amplitude: f64,
    rng: RefCell<SmallRng>,
}

impl<S: Signal> Noisy<S> {
    pub fn new(base: S, amplitude: f64, seed: u64) -> Self {
        Self {
            base,
            amplitude,
            rng: RefCell::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

impl<S: Signal> Signal for Noisy<S> {
    fn value(&self, time: Tick) -> f64 {
        let jitter = self.rng.borrow_mut().gen_range(-1.0..=1.0) * self.amplitude;
        self.base.value(time) + jitter
    }
}

/// Sinusoid: `base + amplitude * sin(2π * time / period)`
#[derive(Debug, Clone, Copy)]
pub struct Periodic {
    pub base: f64,
    pub amplitude: f64,
    pub period: f64,
}

impl Signal for Periodic {
    fn value(&self, time: Tick) -> f64 {
        let phase = (time as f64) / self.period * std::f64::consts::TAU;
        self.base + self.amplitude * phase.sin()
    }
}

/// Piecewise-linear interpolation over `(time, value)` points
///
/// Before the first point and after the last, the signal holds the boundary
/// value.
#[derive(Debug, Clone)]
pub struct Interpolated {
    points: Vec<(Tick, f64)>,
}

impl Interpolated {
    /// Build from points; they must be non-empty and strictly increasing in
    /// time
    pub fn new(points: Vec<(Tick, f64)>) -> Result<Self> {
        if points.is_empty() {
            return Err(EngineError::InvalidConfiguration(
                "interpolated signal needs at least one point".into(),
            ));
        }
        if points.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(EngineError::InvalidConfiguration(
                "interpolated signal points must be strictly increasing in time".into(),
            ));
        }
        Ok(Self { points })
    }
}

impl Signal for Interpolated {
    fn value(&self, time: Tick) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if time <= first.0 {
            return first.1;
        }
        if time >= last.0 {
            return last.1;
        }
        // time is strictly inside some segment
        let index = self.points.partition_point(|(t, _)| *t <= time);
        let (t0, v0) = self.points[index - 1];
        let (t1, v1) = self.points[index];
        let fraction = (time - t0) as f64 / (t1 - t0) as f64;
        v0 + (v1 - v0) * fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant() {
        let signal = Constant(4.0);
        assert_eq!(signal.value(0), 4.0);
        assert_eq!(signal.value(1_000_000), 4.0);
    }

    #[test]
    fn test_noisy_stays_within_amplitude() {
        let signal = Noisy::new(Constant(10.0), 2.0, 9);
        for time in 0..200 {
            let value = signal.value(time);
            assert!((8.0..=12.0).contains(&value), "out of band: {value}");
        }
    }

    #[test]
    fn test_periodic_oscillates_around_base() {
        let signal = Periodic {
            base: 10.0,
            amplitude: 3.0,
            period: 40.0,
        };
        assert!((signal.value(0) - 10.0).abs() < 1e-9);
        assert!((signal.value(10) - 13.0).abs() < 1e-9);
        assert!((signal.value(30) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_interpolated_segments_and_clamping() {
        let signal = Interpolated::new(vec![(10, 0.0), (20, 10.0)]).unwrap();
        assert_eq!(signal.value(0), 0.0);
        assert_eq!(signal.value(10), 0.0);
        assert_eq!(signal.value(15), 5.0);
        assert_eq!(signal.value(20), 10.0);
        assert_eq!(signal.value(99), 10.0);
    }

    #[test]
    fn test_interpolated_rejects_unsorted_points() {
        assert!(Interpolated::new(vec![]).is_err());
        assert!(Interpolated::new(vec![(5, 1.0), (5, 2.0)]).is_err());
        assert!(Interpolated::new(vec![(9, 1.0), (2, 2.0)]).is_err());
    }
}
