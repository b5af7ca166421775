// src/runtime/worker.rs
//! Workers and worker pools
//!
//! A worker is one execution slot of a service: it runs at most one task and
//! carries a service-scoped environment that exposes the worker as the
//! dynamic-scope anchor for calls it services.
//!
//! The pool partitions workers into idle / busy / stopped and keeps the
//! invariant `capacity == idle + busy` across every resize. Shrinking
//! reclaims idle workers first; excess busy workers are marked stopped and
//! drain, disappearing only once their current task completes. No task is
//! ever pre-empted mid-flight.

use crate::kernel::env::{Env, Value, WORKER_BINDING};
use crate::runtime::service::Service;
use crate::runtime::task::Task;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// One execution slot of a service
pub struct Worker {
    id: u64,
    env: Rc<Env>,
    current: RefCell<Option<Rc<Task>>>,
    stopped: Cell<bool>,
}

impl Worker {
    fn new(id: u64, service_env: &Rc<Env>) -> Rc<Self> {
        let env = Env::child(service_env);
        let worker = Rc::new(Self {
            id,
            env,
            current: RefCell::new(None),
            stopped: Cell::new(false),
        });
        worker
            .env
            .define(WORKER_BINDING, Value::Worker(Rc::downgrade(&worker)));
        worker
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The worker's environment: lexically a child of the service scope,
    /// and the dynamic anchor for operation invocations it runs
    pub fn env(&self) -> &Rc<Env> {
        &self.env
    }

    pub fn current(&self) -> Option<Rc<Task>> {
        self.current.borrow().clone()
    }

    pub fn set_current(&self, task: Rc<Task>) {
        *self.current.borrow_mut() = Some(task);
    }

    pub fn clear_current(&self) {
        *self.current.borrow_mut() = None;
    }

    /// True once the worker is draining towards destruction
    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

#[derive(Default)]
struct WorkerSets {
    idle: Vec<Rc<Worker>>,
    busy: Vec<Rc<Worker>>,
    stopped: Vec<Rc<Worker>>,
}

/// Mutable-capacity set of execution slots
pub struct WorkerPool {
    sets: RefCell<WorkerSets>,
    service: RefCell<Weak<Service>>,
    next_id: Cell<u64>,
}

impl WorkerPool {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            sets: RefCell::new(WorkerSets::default()),
            service: RefCell::new(Weak::new()),
            next_id: Cell::new(0),
        })
    }

    /// Wire the owning service; done once at service construction
    pub fn bind_service(&self, service: &Rc<Service>) {
        *self.service.borrow_mut() = Rc::downgrade(service);
    }

    /// Active capacity: idle plus busy (stopped workers are draining and
    /// no longer counted)
    pub fn capacity(&self) -> usize {
        let sets = self.sets.borrow();
        sets.idle.len() + sets.busy.len()
    }

    pub fn idle_count(&self) -> usize {
        self.sets.borrow().idle.len()
    }

    pub fn busy_count(&self) -> usize {
        self.sets.borrow().busy.len()
    }

    /// Fraction of capacity currently busy; zero for an empty pool
    pub fn utilization(&self) -> f64 {
        let sets = self.sets.borrow();
        let capacity = sets.idle.len() + sets.busy.len();
        if capacity == 0 {
            return 0.0;
        }
        sets.busy.len() as f64 / capacity as f64
    }

    /// Acquire an idle worker, moving it to busy
    pub fn take_idle(&self) -> Option<Rc<Worker>> {
        let mut sets = self.sets.borrow_mut();
        let worker = sets.idle.pop()?;
        sets.busy.push(Rc::clone(&worker));
        Some(worker)
    }

    /// Return a busy worker to idle
    pub fn put_idle(&self, worker: &Rc<Worker>) {
        let mut sets = self.sets.borrow_mut();
        sets.busy.retain(|held| !Rc::ptr_eq(held, worker));
        sets.idle.push(Rc::clone(worker));
    }

    /// Destroy a stopped worker whose task has completed
    pub fn retire(&self, worker: &Rc<Worker>) {
        trace!(worker = worker.id(), "retiring stopped worker");
        self.sets
            .borrow_mut()
            .stopped
            .retain(|held| !Rc::ptr_eq(held, worker));
    }

    /// Resize the pool to `target` workers
    ///
    /// Growth creates fresh workers, each immediately eligible for queued
    /// work. Shrinking reclaims idle workers first, then marks excess busy
    /// workers stopped; those drain and are destroyed on completion.
    pub fn set_capacity(&self, target: usize) {
        let current = self.capacity();
        if target > current {
            self.grow(target - current);
        } else if target < current {
            self.shrink(current - target);
        }
    }

    fn grow(&self, count: usize) {
        let Some(service) = self.service.borrow().upgrade() else {
            debug!("worker pool grown before service binding; ignored");
            return;
        };
        let mut fresh = Vec::with_capacity(count);
        {
            let mut sets = self.sets.borrow_mut();
            for _ in 0..count {
                let id = self.next_id.get();
                self.next_id.set(id + 1);
                let worker = Worker::new(id, service.env());
                sets.idle.push(Rc::clone(&worker));
                fresh.push(worker);
            }
        }
        debug!(
            service = service.name(),
            added = count,
            capacity = self.capacity(),
            "worker pool grown"
        );
        // Each new worker may immediately pick up queued work
        for _ in fresh {
            service.dispatch_idle();
        }
    }

    fn shrink(&self, count: usize) {
        let mut sets = self.sets.borrow_mut();
        let mut remaining = count;
        while remaining > 0 {
            if let Some(worker) = sets.idle.pop() {
                drop(worker);
            } else if let Some(worker) = sets.busy.pop() {
                worker.stopped.set(true);
                sets.stopped.push(worker);
            } else {
                break;
            }
            remaining -= 1;
        }
        debug!(
            removed = count - remaining,
            capacity = sets.idle.len() + sets.busy.len(),
            draining = sets.stopped.len(),
            "worker pool shrunk"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::scheduler::Scheduler;
    use crate::runtime::task_pool::{Discipline, PriorityTaskPool};
    use proptest::prelude::*;

    // The pool resizes through its owning service, so tests must keep the
    // service alive alongside the pool handle.
    fn pool_with_service() -> (Rc<Service>, Rc<WorkerPool>) {
        let scheduler = Scheduler::new(1);
        let service = Service::build(
            "svc",
            &Env::root(),
            PriorityTaskPool::new(Discipline::Fifo),
            &scheduler,
        );
        let pool = Rc::clone(service.workers());
        (service, pool)
    }

    #[test]
    fn test_dynamic_chain_resolves_executing_worker() {
        let (_service, pool) = pool_with_service();
        pool.set_capacity(1);
        let worker = pool.take_idle().unwrap();

        // An invocation scope hangs off the worker's environment through
        // its dynamic parent
        let scope = Env::child(&Env::root());
        scope.set_dynamic_parent(worker.env());
        let resolved = scope.executing_worker();
        assert_eq!(resolved.map(|w| w.id()), Some(worker.id()));

        // A scope with no worker on its dynamic chain resolves to nothing
        assert!(Env::root().executing_worker().is_none());
    }

    #[test]
    fn test_capacity_counts_idle_plus_busy() {
        let (_service, pool) = pool_with_service();
        pool.set_capacity(3);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.idle_count(), 3);

        let worker = pool.take_idle().unwrap();
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.busy_count(), 1);

        pool.put_idle(&worker);
        assert_eq!(pool.idle_count(), 3);
    }

    #[test]
    fn test_shrink_prefers_idle_workers() {
        let (_service, pool) = pool_with_service();
        pool.set_capacity(3);
        let busy = pool.take_idle().unwrap();

        pool.set_capacity(1);
        // The busy worker survives; both idle workers were reclaimed
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.busy_count(), 1);
        assert!(!busy.is_stopped());
    }

    #[test]
    fn test_shrink_below_busy_marks_stopped() {
        let (_service, pool) = pool_with_service();
        pool.set_capacity(2);
        let first = pool.take_idle().unwrap();
        let second = pool.take_idle().unwrap();

        pool.set_capacity(1);
        assert_eq!(pool.capacity(), 1);
        // One of the two busy workers is draining
        assert!(first.is_stopped() ^ second.is_stopped());

        let stopped = if first.is_stopped() { first } else { second };
        pool.retire(&stopped);
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn test_utilization() {
        let (_service, pool) = pool_with_service();
        assert_eq!(pool.utilization(), 0.0);
        pool.set_capacity(4);
        let _w = pool.take_idle().unwrap();
        assert!((pool.utilization() - 0.25).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_capacity_invariant_over_resizes(targets in proptest::collection::vec(0usize..16, 1..24)) {
            let (_service, pool) = pool_with_service();
            for target in targets {
                pool.set_capacity(target);
                prop_assert_eq!(pool.capacity(), target);
                prop_assert_eq!(pool.capacity(), pool.idle_count() + pool.busy_count());
            }
        }
    }
}
