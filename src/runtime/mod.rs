// src/runtime/mod.rs
//! Runtime entities
//!
//! Everything that exists while a simulation runs:
//!
//! - **Service**: worker pool, admission queue, named operations
//! - **Task / Request**: one call in flight and its wire-level envelope
//! - **Evaluator**: continuation-passing walk of behavior bodies
//! - **Client Stub**: open-loop workload generation
//! - **AutoScaler / Throttling / Backoff**: the control surfaces around them
//!
//! # Architecture
//!
//! ```text
//!   ClientStub ──request──▶ Service ──▶ TaskPool ──▶ WorkerPool
//!        ▲                     │                         │
//!        │                     ▼                         ▼
//!        └──reply/ack──── Evaluator ◀──operation body────┘
//!                              │
//!                              └──▶ downstream Services (Trigger / Query)
//! ```
//!
//! The whole runtime is single-threaded: entities share state through
//! `Rc`/`RefCell`, and concurrency exists only in logical time.

pub mod autoscaler;
pub mod backoff;
pub mod client;
pub mod evaluator;
pub mod request;
pub mod service;
pub mod task;
pub mod task_pool;
pub mod throttling;
pub mod worker;

// Re-export commonly used types
pub use autoscaler::{LoadSnapshot, RuleBasedStrategy, ScalingStrategy};
pub use backoff::BackoffStrategy;
pub use client::ClientStub;
pub use evaluator::{Continuation, Evaluator, Outcome, Resumption};
pub use request::{Request, RequestStatus};
pub use service::{Operation, Service};
pub use task::{CallContext, Task, TaskState};
pub use task_pool::{Discipline, PriorityTaskPool, TaskPool};
pub use throttling::{NoThrottling, TailDrop};
pub use worker::{Worker, WorkerPool};
