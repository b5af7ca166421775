// src/utils/errors.rs
//! Engine error types
//!
//! Only two classes of failure abort a run: configuration errors caught while
//! loading a program, and scheduling-contract violations (moving the clock
//! backwards, scheduling into the past). Simulated failures — rejected,
//! timed-out or erroring requests — are domain outcomes, not errors, and flow
//! through the evaluator as data.

use crate::kernel::clock::Tick;
use thiserror::Error;

/// Engine-level error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// The logical clock was asked to move backwards.
    #[error("clock cannot move backwards: now {now}, requested {requested}")]
    TimeRegression { now: Tick, requested: Tick },

    /// An event was scheduled at a time that has already passed.
    #[error("event scheduled in the past: due {due}, now {now}")]
    PastEvent { due: Tick, now: Tick },

    /// A definition failed its construction-time checks.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A behavior references a service that was never defined.
    #[error("unknown service `{0}`")]
    UnknownService(String),

    /// A behavior references an operation the target service does not define.
    #[error("unknown operation `{0}::{1}`")]
    UnknownOperation(String, String),

    /// Two definitions share the same name.
    #[error("duplicate definition `{0}`")]
    DuplicateDefinition(String),

    /// Configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Engine-wide result alias
pub type Result<T> = std::result::Result<T, EngineError>;
