// src/model/program.rs
//! Declarative simulation programs
//!
//! A program is the load-time half of the behavior tree: a list of service
//! and client-stub definitions. Loading a program materializes the
//! corresponding long-lived entities and binds them in the simulation's root
//! environment; nothing here runs per-request.

use crate::kernel::clock::Tick;
use crate::model::behavior::Behavior;
use crate::model::signal::{Constant, Signal};
use crate::runtime::autoscaler::ScalingStrategy;
use crate::runtime::task_pool::Discipline;
use crate::utils::errors::{EngineError, Result};
use std::rc::Rc;

/// A complete declarative program
#[derive(Default)]
pub struct Program {
    pub definitions: Vec<Definition>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a service definition
    pub fn service(mut self, service: ServiceDef) -> Self {
        self.definitions.push(Definition::Service(service));
        self
    }

    /// Append a client-stub definition
    pub fn client(mut self, client: ClientDef) -> Self {
        self.definitions.push(Definition::Client(client));
        self
    }
}

/// One top-level definition
pub enum Definition {
    Service(ServiceDef),
    Client(ClientDef),
}

/// A named operation and its behavior body
pub struct OperationDef {
    pub name: String,
    pub body: Rc<Behavior>,
}

/// Admission control in front of a service's task pool
#[derive(Debug, Clone, Copy, Default)]
pub enum ThrottlingSpec {
    /// Admit everything
    #[default]
    None,
    /// Reject once the pool holds `capacity` eligible tasks
    TailDrop { capacity: usize },
}

/// Periodic capacity control for a service's worker pool
pub struct AutoScalerSpec {
    pub period: Tick,
    pub min: usize,
    pub max: usize,
    pub strategy: Box<dyn ScalingStrategy>,
}

impl AutoScalerSpec {
    /// Validated constructor; `period` must be positive and `min <= max`
    pub fn new(
        period: Tick,
        min: usize,
        max: usize,
        strategy: Box<dyn ScalingStrategy>,
    ) -> Result<Self> {
        if period < 1 {
            return Err(EngineError::InvalidConfiguration(
                "autoscaler period must be >= 1".into(),
            ));
        }
        if min > max {
            return Err(EngineError::InvalidConfiguration(format!(
                "autoscaler limits are malformed: min {min} > max {max}"
            )));
        }
        Ok(Self {
            period,
            min,
            max,
            strategy,
        })
    }
}

/// Definition of a simulated service
pub struct ServiceDef {
    pub name: String,
    pub workers: usize,
    pub discipline: Discipline,
    pub throttling: ThrottlingSpec,
    pub autoscaler: Option<AutoScalerSpec>,
    pub operations: Vec<OperationDef>,
}

impl ServiceDef {
    /// A service with `workers` initial execution slots
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        Self {
            name: name.into(),
            workers,
            discipline: Discipline::Fifo,
            throttling: ThrottlingSpec::None,
            autoscaler: None,
            operations: Vec::new(),
        }
    }

    /// Add an operation
    pub fn operation(mut self, name: impl Into<String>, body: Behavior) -> Self {
        self.operations.push(OperationDef {
            name: name.into(),
            body: Rc::new(body),
        });
        self
    }

    /// Set the task-pool tie-break discipline
    pub fn discipline(mut self, discipline: Discipline) -> Self {
        self.discipline = discipline;
        self
    }

    /// Install tail-drop admission control
    pub fn tail_drop(mut self, capacity: usize) -> Self {
        self.throttling = ThrottlingSpec::TailDrop { capacity };
        self
    }

    /// Attach an autoscaler
    pub fn autoscaler(mut self, spec: AutoScalerSpec) -> Self {
        self.autoscaler = Some(spec);
        self
    }
}

/// Definition of a workload-generating client stub
pub struct ClientStubDef {
    pub name: String,
    pub body: Rc<Behavior>,
    pub start: Tick,
    pub period: Rc<dyn Signal>,
}

/// Alias kept short in program-building code
pub type ClientDef = ClientStubDef;

impl ClientStubDef {
    /// A client evaluating `body` every 1 tick, starting at tick 0
    pub fn new(name: impl Into<String>, body: Behavior) -> Self {
        Self {
            name: name.into(),
            body: Rc::new(body),
            start: 0,
            period: Rc::new(Constant(1.0)),
        }
    }

    /// First emission tick
    pub fn start(mut self, start: Tick) -> Self {
        self.start = start;
        self
    }

    /// Fixed emission period
    pub fn every(mut self, period: Tick) -> Self {
        self.period = Rc::new(Constant(period as f64));
        self
    }

    /// Emission period shaped by a signal of logical time
    pub fn period(mut self, signal: Rc<dyn Signal>) -> Self {
        self.period = signal;
        self
    }
}
