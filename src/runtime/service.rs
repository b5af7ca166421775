// src/runtime/service.rs
//! Services and operations
//!
//! A service owns a worker pool, an admission-controlled task queue, and a
//! set of named operations. The flow of one request:
//!
//! ```text
//!         process()                    assign()              complete()
//!   request ──────▶ idle worker? ──▶ run operation body ──▶ reply + release
//!                      │ no
//!                      ▼
//!                   queue.put() ──▶ accepted (waits)   full ──▶ rejected
//! ```
//!
//! Workers are released the moment a task pauses on a downstream call, so a
//! service keeps serving while earlier requests wait on their dependencies.
//! Every admission decision acknowledges the sender exactly once, and every
//! accepted request gets exactly one reply.

use crate::kernel::env::{Env, Value, CONTEXT_BINDING};
use crate::kernel::scheduler::Scheduler;
use crate::model::behavior::Behavior;
use crate::monitoring::listener::Dispatcher;
use crate::runtime::evaluator::{Continuation, Evaluator, Outcome};
use crate::runtime::request::Request;
use crate::runtime::task::{CallContext, Task, TaskState};
use crate::runtime::task_pool::TaskPool;
use crate::runtime::worker::{Worker, WorkerPool};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, error, trace, warn};

/// A named operation: a behavior body closed over its definition scope
pub struct Operation {
    name: String,
    body: Rc<Behavior>,
    env: Rc<Env>,
}

impl Operation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &Rc<Behavior> {
        &self.body
    }

    /// The scope the operation was defined in; invocation environments are
    /// lexical children of this
    pub fn env(&self) -> &Rc<Env> {
        &self.env
    }
}

/// A simulated service: workers, queue, and operations
pub struct Service {
    name: String,
    env: Rc<Env>,
    workers: Rc<WorkerPool>,
    queue: Rc<dyn TaskPool>,
    dispatcher: Rc<Dispatcher>,
    scheduler: Rc<Scheduler>,
    evaluator: RefCell<Weak<Evaluator>>,
    request_seq: Cell<u64>,
}

impl Service {
    /// Build a service scoped under `parent`, with `queue` guarding
    /// admission to its worker pool
    pub fn build(
        name: impl Into<String>,
        parent: &Rc<Env>,
        queue: Rc<dyn TaskPool>,
        scheduler: &Rc<Scheduler>,
    ) -> Rc<Self> {
        let service = Rc::new(Self {
            name: name.into(),
            env: Env::child(parent),
            workers: WorkerPool::new(),
            queue,
            dispatcher: Dispatcher::new(),
            scheduler: Rc::clone(scheduler),
            evaluator: RefCell::new(Weak::new()),
            request_seq: Cell::new(0),
        });
        service.workers.bind_service(&service);
        service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &Rc<Env> {
        &self.env
    }

    pub fn workers(&self) -> &Rc<WorkerPool> {
        &self.workers
    }

    pub fn queue(&self) -> &Rc<dyn TaskPool> {
        &self.queue
    }

    pub fn dispatcher(&self) -> Rc<Dispatcher> {
        Rc::clone(&self.dispatcher)
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    /// Wire the evaluator that runs operation bodies; done once at load
    pub fn bind_evaluator(&self, evaluator: &Rc<Evaluator>) {
        *self.evaluator.borrow_mut() = Rc::downgrade(evaluator);
    }

    /// Monotonic id generator for requests this service sends downstream
    pub fn next_request_id(&self) -> u64 {
        let id = self.request_seq.get();
        self.request_seq.set(id + 1);
        id
    }

    /// Define an operation in the service scope
    pub fn define_operation(self: &Rc<Self>, name: impl Into<String>, body: impl Into<Rc<Behavior>>) {
        let name = name.into();
        let operation = Rc::new(Operation {
            name: name.clone(),
            body: body.into(),
            env: Rc::clone(&self.env),
        });
        self.env.define(&name, Value::Operation(operation));
    }

    /// Admit an incoming request: assign, queue, or reject
    pub fn process(self: &Rc<Self>, request: Rc<Request>) {
        let task = Task::new(Rc::clone(&request), self);
        self.dispatcher.task_created(&task);

        if let Some(worker) = self.workers.take_idle() {
            self.accept(&task);
            self.assign(worker, task);
        } else if self.queue.put(Rc::clone(&task)) {
            task.set_state(TaskState::Queued);
            self.accept(&task);
        } else {
            debug!(
                service = self.name,
                request = request.id(),
                "admission refused, queue full"
            );
            request.acknowledge(false);
            task.set_state(TaskState::Rejected);
            self.dispatcher.task_rejected(&task);
            if let Some(hook) = request.take_ack_hook() {
                hook(&request, false);
            }
        }
    }

    fn accept(&self, task: &Rc<Task>) {
        let request = task.request();
        request.acknowledge(true);
        self.dispatcher.task_accepted(task);
        if let Some(hook) = request.take_ack_hook() {
            hook(request, true);
        }
    }

    /// Park a task that paused on a downstream call and free its worker
    pub fn suspend(self: &Rc<Self>, task: &Rc<Task>) {
        trace!(
            service = self.name,
            request = task.request().id(),
            "task paused"
        );
        self.queue.pause(task);
        if let Some(worker) = task.release_worker() {
            worker.clear_current();
            self.release(worker);
        }
    }

    /// Move a paused task to reactivated and try to resume it
    pub fn activate(self: &Rc<Self>, task: &Rc<Task>) {
        task.set_state(TaskState::Reactivated);
        self.dispatcher.task_activated(task);
        self.queue.activate(task);
        self.dispatch_idle();
    }

    /// Pair one idle worker with the next runnable task, if both exist
    pub fn dispatch_idle(self: &Rc<Self>) {
        if let Some(worker) = self.workers.take_idle() {
            if let Some(task) = self.queue.take() {
                self.assign(worker, task);
            } else {
                self.workers.put_idle(&worker);
            }
        }
    }

    /// Hand a freed worker its next task, retire it if draining, or idle it
    pub fn release(self: &Rc<Self>, worker: Rc<Worker>) {
        if worker.is_stopped() {
            self.workers.retire(&worker);
            return;
        }
        if let Some(task) = self.queue.take() {
            self.assign(worker, task);
        } else {
            self.workers.put_idle(&worker);
        }
    }

    fn assign(self: &Rc<Self>, worker: Rc<Worker>, task: Rc<Task>) {
        let request = Rc::clone(task.request());

        if !request.is_pending() {
            // The sender gave up (timeout) while the task sat queued or
            // paused; don't burn the worker on it.
            warn!(
                service = self.name,
                request = request.id(),
                "dropping stale task, request no longer pending"
            );
            let _ = task.take_resumption();
            task.set_state(TaskState::Cancelled);
            self.dispatcher.task_cancelled(&task);
            task.clear_env();
            self.release(worker);
            return;
        }

        task.bind_worker(&worker);
        worker.set_current(Rc::clone(&task));
        task.set_state(TaskState::Assigned);
        self.dispatcher.task_assigned_to(&task, worker.id());

        if !task.started() {
            task.mark_started();
            self.start(worker, task, request);
        } else {
            self.resume(task, request);
        }
    }

    fn start(self: &Rc<Self>, worker: Rc<Worker>, task: Rc<Task>, request: Rc<Request>) {
        let Some(operation) = self
            .env
            .lookup(request.operation())
            .and_then(|value| value.as_operation())
        else {
            error!(
                service = self.name,
                operation = request.operation(),
                "operation not defined, failing request"
            );
            self.complete(&task, Outcome::Error);
            return;
        };

        // Invocation scope: lexically under the definition scope,
        // dynamically under the executing worker.
        let invocation = Env::child(operation.env());
        invocation.set_dynamic_parent(worker.env());
        invocation.define(
            CONTEXT_BINDING,
            Value::Context(Rc::clone(&task) as Rc<dyn CallContext>),
        );
        task.set_env(Rc::clone(&invocation));

        let Some(evaluator) = self.evaluator.borrow().upgrade() else {
            error!(service = self.name, "no evaluator bound, failing request");
            self.complete(&task, Outcome::Error);
            return;
        };

        let this = Rc::clone(self);
        let done = Rc::clone(&task);
        let finish: Continuation = Rc::new(move |outcome| this.complete(&done, outcome));
        evaluator.evaluate(&invocation, operation.body(), finish);
    }

    fn resume(self: &Rc<Self>, task: Rc<Task>, request: Rc<Request>) {
        if let Some(env) = task.env() {
            if let Some(worker) = task.worker() {
                env.set_dynamic_parent(worker.env());
            }
        }
        let Some(resumption) = task.take_resumption() else {
            warn!(
                service = self.name,
                request = request.id(),
                "reactivated task has no resumption; discarding"
            );
            task.set_state(TaskState::Cancelled);
            self.dispatcher.task_cancelled(&task);
            task.clear_env();
            if let Some(worker) = task.release_worker() {
                worker.clear_current();
                self.release(worker);
            }
            return;
        };
        let outcome = task.take_wake_outcome().unwrap_or(Outcome::Error);
        resumption(outcome);
    }

    /// Finish a task: record the reply, notify, and free its worker
    pub fn complete(self: &Rc<Self>, task: &Rc<Task>, outcome: Outcome) {
        let request = Rc::clone(task.request());
        if request.is_pending() {
            let success = matches!(outcome, Outcome::Success(_));
            if success {
                request.succeed(self.scheduler.now());
                task.set_state(TaskState::Successful);
                self.dispatcher.task_successful(task);
            } else {
                request.fail();
                task.set_state(TaskState::Failed);
                self.dispatcher.task_failed(task);
            }
            if let Some(hook) = request.take_reply_hook() {
                hook(&request, success);
            }
        } else {
            // Reply raced a sender-side timeout and lost
            warn!(
                service = self.name,
                request = request.id(),
                "late reply for settled request dropped"
            );
            task.set_state(TaskState::Cancelled);
            self.dispatcher.task_cancelled(task);
        }
        task.clear_env();

        if let Some(worker) = task.release_worker() {
            worker.clear_current();
            self.release(worker);
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("capacity", &self.workers.capacity())
            .field("queued", &self.queue.size())
            .finish()
    }
}
