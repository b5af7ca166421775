// src/monitoring/mod.rs
//! Observability
//!
//! - **listener**: lifecycle events and their per-entity dispatcher
//! - **monitor**: window-counting service monitors producing report records
//! - **report**: sinks the records flow to (CSV, JSON lines, in-memory)

pub mod listener;
pub mod monitor;
pub mod report;

pub use listener::{Dispatcher, Listener};
pub use monitor::{ReportRecord, ServiceMonitor};
pub use report::{CsvSink, JsonLinesSink, MemorySink, ReportSink};
