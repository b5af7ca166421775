// src/runtime/throttling.rs
//! Admission control
//!
//! Throttling policies decorate a task pool: `put` is intercepted, every
//! other capability forwards to the wrapped pool. A rejected task never
//! enters the pool at all; the owning service fails the request
//! synchronously.

use crate::runtime::task::Task;
use crate::runtime::task_pool::TaskPool;
use crate::utils::errors::{EngineError, Result};
use std::rc::Rc;
use tracing::debug;

/// Pass-through policy admitting every task
pub struct NoThrottling {
    inner: Rc<dyn TaskPool>,
}

impl NoThrottling {
    pub fn new(inner: Rc<dyn TaskPool>) -> Rc<Self> {
        Rc::new(Self { inner })
    }
}

impl TaskPool for NoThrottling {
    fn put(&self, task: Rc<Task>) -> bool {
        self.inner.put(task)
    }

    fn take(&self) -> Option<Rc<Task>> {
        self.inner.take()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn pause(&self, task: &Rc<Task>) {
        self.inner.pause(task);
    }

    fn activate(&self, task: &Rc<Task>) {
        self.inner.activate(task);
    }
}

/// Tail-drop policy: admit while the wrapped pool holds fewer than
/// `capacity` assignable tasks, reject otherwise
pub struct TailDrop {
    capacity: usize,
    inner: Rc<dyn TaskPool>,
}

impl TailDrop {
    /// Validated constructor; `capacity` must be positive
    pub fn new(capacity: usize, inner: Rc<dyn TaskPool>) -> Result<Rc<Self>> {
        if capacity == 0 {
            return Err(EngineError::InvalidConfiguration(
                "tail-drop capacity must be a positive integer".into(),
            ));
        }
        Ok(Rc::new(Self { capacity, inner }))
    }
}

impl std::fmt::Debug for TailDrop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailDrop")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl TaskPool for TailDrop {
    fn put(&self, task: Rc<Task>) -> bool {
        if self.inner.size() >= self.capacity {
            debug!(
                request = task.request().id(),
                capacity = self.capacity,
                "tail-drop rejected task"
            );
            return false;
        }
        self.inner.put(task)
    }

    fn take(&self) -> Option<Rc<Task>> {
        self.inner.take()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn pause(&self, task: &Rc<Task>) {
        self.inner.pause(task);
    }

    fn activate(&self, task: &Rc<Task>) {
        self.inner.activate(task);
    }
}
