// src/kernel/mod.rs
//! Simulation kernel
//!
//! The pieces everything else is built on:
//!
//! - **Clock**: the monotonic logical tick counter
//! - **Scheduler**: the event pool and the run loop driving time forward
//! - **Env**: hierarchical name→value scopes with independent lexical and
//!   dynamic parent relations

pub mod clock;
pub mod env;
pub mod scheduler;

pub use clock::{Clock, Tick};
pub use env::{Env, Value, CONTEXT_BINDING, WORKER_BINDING};
pub use scheduler::{EventFn, Scheduler};
