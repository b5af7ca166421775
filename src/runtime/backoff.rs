// src/runtime/backoff.rs
//! Retry backoff strategies
//!
//! Pure functions from attempt index to delay. The attempt index is zero for
//! the first re-evaluation, so an exponential strategy retries immediately
//! once before spreading out.

use crate::kernel::clock::Tick;
use rand::rngs::SmallRng;
use rand::Rng;

/// Delay as a function of how many attempts have already failed
#[derive(Debug, Clone, Copy)]
pub enum BackoffStrategy {
    /// Always the same delay
    Constant { base: Tick },
    /// `base * uniform(0, 2^attempts - 1)`; attempt 0 yields zero delay
    Exponential { base: Tick },
}

impl BackoffStrategy {
    pub fn constant(base: Tick) -> Self {
        BackoffStrategy::Constant { base }
    }

    pub fn exponential(base: Tick) -> Self {
        BackoffStrategy::Exponential { base }
    }

    /// Delay before re-evaluation number `attempt + 1`
    pub fn delay(&self, attempt: u32, rng: &mut SmallRng) -> Tick {
        match self {
            BackoffStrategy::Constant { base } => *base,
            BackoffStrategy::Exponential { base } => {
                let ceiling = (1u64 << attempt.min(32)) - 1;
                if ceiling == 0 {
                    return 0;
                }
                let factor = rng.gen_range(0.0..=ceiling as f64);
                (*base as f64 * factor).round() as Tick
            }
        }
    }
}
