// src/lib.rs
//! Discrete-event simulation engine for microservice capacity planning
//!
//! Models a mesh of services as a discrete-event system: logical time, a
//! randomized-tie-break event scheduler, and behavior trees describing what
//! each operation does. Runs answer capacity questions — worker counts,
//! queue bounds, retry policies, autoscaling bands — without deploying
//! anything.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **kernel**: logical clock, event scheduler, hierarchical environments
//! - **model**: behavior trees, program definitions, load-shaping signals
//! - **runtime**: services, workers, tasks, clients, and the CPS evaluator
//! - **monitoring**: lifecycle listeners, per-service monitors, report sinks
//! - **simulation**: the facade loading programs and driving runs
//! - **utils**: configuration and error types

// Public module exports
pub mod kernel;
pub mod model;
pub mod monitoring;
pub mod runtime;
pub mod simulation;
pub mod utils;

// Re-export commonly used types
pub use kernel::{Scheduler, Tick};
pub use model::{Behavior, ClientDef, Program, ServiceDef};
pub use monitoring::{ReportRecord, ReportSink};
pub use runtime::{BackoffStrategy, Discipline, Outcome, RuleBasedStrategy};
pub use simulation::Simulation;
pub use utils::config::SimulationConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
