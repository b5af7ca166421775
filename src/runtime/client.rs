// src/runtime/client.rs
//! Client stubs: open-loop workload generators
//!
//! A client stub evaluates its behavior body on a self-rearming cadence. The
//! emission period is sampled from a signal of logical time, so load shapes
//! (ramps, waves, noise) come from the model layer rather than from client
//! code. Emissions are open-loop: a new evaluation starts on schedule whether
//! or not earlier ones have finished.
//!
//! Clients have no workers. A paused client evaluation resumes the instant
//! its awaited answer arrives.

use crate::kernel::clock::Tick;
use crate::kernel::env::{Env, Value, CONTEXT_BINDING};
use crate::kernel::scheduler::Scheduler;
use crate::model::behavior::Behavior;
use crate::model::signal::Signal;
use crate::monitoring::listener::Dispatcher;
use crate::runtime::evaluator::{Evaluator, Outcome, Resumption};
use crate::runtime::task::CallContext;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

/// A workload-generating client
pub struct ClientStub {
    name: String,
    env: Rc<Env>,
    body: Rc<Behavior>,
    period: Rc<dyn Signal>,
    dispatcher: Rc<Dispatcher>,
    scheduler: Rc<Scheduler>,
    evaluator: RefCell<Weak<Evaluator>>,
    request_seq: Cell<u64>,
    emitted: Cell<u64>,
    succeeded: Cell<u64>,
    failed: Cell<u64>,
}

impl ClientStub {
    pub fn build(
        name: impl Into<String>,
        parent: &Rc<Env>,
        body: Rc<Behavior>,
        period: Rc<dyn Signal>,
        scheduler: &Rc<Scheduler>,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            env: Env::child(parent),
            body,
            period,
            dispatcher: Dispatcher::new(),
            scheduler: Rc::clone(scheduler),
            evaluator: RefCell::new(Weak::new()),
            request_seq: Cell::new(0),
            emitted: Cell::new(0),
            succeeded: Cell::new(0),
            failed: Cell::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dispatcher(&self) -> Rc<Dispatcher> {
        Rc::clone(&self.dispatcher)
    }

    /// Evaluations started so far
    pub fn emitted(&self) -> u64 {
        self.emitted.get()
    }

    /// Evaluations finished with Success
    pub fn succeeded(&self) -> u64 {
        self.succeeded.get()
    }

    /// Evaluations finished with Error
    pub fn failed(&self) -> u64 {
        self.failed.get()
    }

    pub fn bind_evaluator(&self, evaluator: &Rc<Evaluator>) {
        *self.evaluator.borrow_mut() = Rc::downgrade(evaluator);
    }

    pub fn next_request_id(&self) -> u64 {
        let id = self.request_seq.get();
        self.request_seq.set(id + 1);
        id
    }

    /// Begin emitting, first evaluation at `start`
    pub fn start(self: &Rc<Self>, start: Tick) {
        let now = self.scheduler.now();
        let delay = start.saturating_sub(now);
        let this = Rc::clone(self);
        self.scheduler.schedule_after(
            delay,
            Box::new(move || {
                this.cycle();
            }),
        );
    }

    fn cycle(self: &Rc<Self>) {
        self.emit();
        let now = self.scheduler.now();
        let period = self.period.value(now).round().max(1.0) as Tick;
        let this = Rc::clone(self);
        self.scheduler.schedule_after(
            period,
            Box::new(move || {
                this.cycle();
            }),
        );
    }

    fn emit(self: &Rc<Self>) {
        let Some(evaluator) = self.evaluator.borrow().upgrade() else {
            warn!(client = self.name, "emission with no evaluator bound");
            return;
        };
        self.emitted.set(self.emitted.get() + 1);
        trace!(
            client = self.name,
            tick = self.scheduler.now(),
            "starting evaluation"
        );

        let call = ClientCall::new(self);
        let env = Env::child(&self.env);
        env.define(CONTEXT_BINDING, Value::Context(call as Rc<dyn CallContext>));

        let this = Rc::clone(self);
        evaluator.evaluate(
            &env,
            &self.body,
            Rc::new(move |outcome| match outcome {
                Outcome::Success(_) => this.succeeded.set(this.succeeded.get() + 1),
                _ => {
                    this.failed.set(this.failed.get() + 1);
                    debug!(client = this.name, "evaluation failed");
                }
            }),
        );
    }
}

/// One in-flight client evaluation
///
/// Unlike a worker-bound task, a client call resumes immediately when woken:
/// there is no queue or worker to reacquire.
pub struct ClientCall {
    owner: Weak<ClientStub>,
    events: Rc<Dispatcher>,
    resumption: RefCell<Option<Resumption>>,
}

impl ClientCall {
    fn new(owner: &Rc<ClientStub>) -> Rc<Self> {
        Rc::new(Self {
            owner: Rc::downgrade(owner),
            events: owner.dispatcher(),
            resumption: RefCell::new(None),
        })
    }
}

impl CallContext for ClientCall {
    fn pause(&self, resumption: Resumption) {
        *self.resumption.borrow_mut() = Some(resumption);
    }

    fn wake(&self, outcome: Outcome) {
        match self.resumption.borrow_mut().take() {
            Some(resumption) => resumption(outcome),
            None => warn!("client call woken without a stored resumption"),
        }
    }

    fn events(&self) -> Rc<Dispatcher> {
        Rc::clone(&self.events)
    }

    fn next_request_id(&self) -> u64 {
        self.owner.upgrade().map_or(0, |client| client.next_request_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::signal::Constant;
    use crate::runtime::service::Service;
    use crate::runtime::task_pool::{Discipline, PriorityTaskPool};

    fn harness() -> (Rc<Env>, Rc<Scheduler>, Rc<Evaluator>) {
        let scheduler = Scheduler::new(11);
        let root = Env::root();
        let evaluator = Evaluator::new(&scheduler, &root, 11);
        (root, scheduler, evaluator)
    }

    #[test]
    fn test_open_loop_cadence() {
        let (root, scheduler, evaluator) = harness();
        let service = Service::build(
            "backend",
            &root,
            PriorityTaskPool::new(Discipline::Fifo),
            &scheduler,
        );
        service.bind_evaluator(&evaluator);
        service.workers().set_capacity(1);
        service.define_operation("op", Behavior::think(3));
        root.define("backend", Value::Service(Rc::clone(&service)));

        let client = ClientStub::build(
            "load",
            &root,
            Rc::new(Behavior::query("backend", "op")),
            Rc::new(Constant(10.0)),
            &scheduler,
        );
        client.bind_evaluator(&evaluator);
        client.start(0);

        scheduler.run_until(35).unwrap();
        // Emissions at 0, 10, 20, 30; replies at 3, 13, 23, 33
        assert_eq!(client.emitted(), 4);
        assert_eq!(client.succeeded(), 4);
        assert_eq!(client.failed(), 0);
    }

    #[test]
    fn test_deferred_start() {
        let (root, scheduler, evaluator) = harness();
        let client = ClientStub::build(
            "late",
            &root,
            Rc::new(Behavior::think(1)),
            Rc::new(Constant(5.0)),
            &scheduler,
        );
        client.bind_evaluator(&evaluator);
        client.start(20);

        scheduler.run_until(19).unwrap();
        assert_eq!(client.emitted(), 0);
        scheduler.run_until(30).unwrap();
        // Emissions at 20, 25, 30
        assert_eq!(client.emitted(), 3);
    }
}
