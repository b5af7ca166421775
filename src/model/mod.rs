// src/model/mod.rs
//! Program model
//!
//! - **behavior**: the behavior-tree AST the evaluator walks
//! - **program**: load-time service and client-stub definitions
//! - **signal**: functions of logical time used to shape workload emission

pub mod behavior;
pub mod program;
pub mod signal;

pub use behavior::Behavior;
pub use program::{
    AutoScalerSpec, ClientDef, ClientStubDef, Definition, OperationDef, Program, ServiceDef,
    ThrottlingSpec,
};
pub use signal::{Constant, Interpolated, Noisy, Periodic, Signal};
