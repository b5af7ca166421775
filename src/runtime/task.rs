// src/runtime/task.rs
//! Tasks: the in-progress handling of one request
//!
//! A task wraps a request together with the continuation needed to resume
//! its operation body after a blocking call. Suspension is explicit state,
//! not a call stack: pausing records a resumption closure on the task and
//! relinquishes the worker; resuming rebinds the task's dynamic scope to the
//! new worker and invokes the stored closure.

use crate::kernel::clock::Tick;
use crate::kernel::env::Env;
use crate::monitoring::listener::Dispatcher;
use crate::runtime::evaluator::{Outcome, Resumption};
use crate::runtime::request::Request;
use crate::runtime::service::Service;
use crate::runtime::worker::Worker;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::warn;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Queued,
    Assigned,
    Paused,
    Reactivated,
    Successful,
    Failed,
    Cancelled,
    Rejected,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Successful | TaskState::Failed | TaskState::Cancelled | TaskState::Rejected
        )
    }
}

/// The calling side of a remote call
///
/// Both worker-bound tasks and client emissions can issue calls; the
/// evaluator reaches whichever is executing through the dynamic scope and
/// talks to it through this interface.
pub trait CallContext {
    /// Suspend the running evaluation, recording how to resume it
    fn pause(&self, resumption: Resumption);

    /// Deliver the awaited answer; the context decides when the stored
    /// resumption actually runs
    fn wake(&self, outcome: Outcome);

    /// Lifecycle fan-out for the calling entity
    fn events(&self) -> Rc<Dispatcher>;

    /// Monotonic request-id generator of the sender
    fn next_request_id(&self) -> u64;
}

/// One request being handled by a service
pub struct Task {
    me: Weak<Task>,
    request: Rc<Request>,
    service: Weak<Service>,
    events: Rc<Dispatcher>,
    emission: Tick,
    state: Cell<TaskState>,
    started: Cell<bool>,
    worker: RefCell<Weak<Worker>>,
    env: RefCell<Option<Rc<Env>>>,
    resumption: RefCell<Option<Resumption>>,
    wake_outcome: RefCell<Option<Outcome>>,
}

impl Task {
    pub fn new(request: Rc<Request>, service: &Rc<Service>) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            request,
            service: Rc::downgrade(service),
            events: service.dispatcher(),
            emission: request_emission(service),
            state: Cell::new(TaskState::Created),
            started: Cell::new(false),
            worker: RefCell::new(Weak::new()),
            env: RefCell::new(None),
            resumption: RefCell::new(None),
            wake_outcome: RefCell::new(None),
        })
    }

    pub fn request(&self) -> &Rc<Request> {
        &self.request
    }

    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    pub fn set_state(&self, state: TaskState) {
        self.state.set(state);
    }

    pub fn emission(&self) -> Tick {
        self.emission
    }

    pub fn started(&self) -> bool {
        self.started.get()
    }

    pub fn mark_started(&self) {
        self.started.set(true);
    }

    /// The worker currently bound to this task, if any
    pub fn worker(&self) -> Option<Rc<Worker>> {
        self.worker.borrow().upgrade()
    }

    pub fn bind_worker(&self, worker: &Rc<Worker>) {
        *self.worker.borrow_mut() = Rc::downgrade(worker);
    }

    /// Unbind and return the current worker
    pub fn release_worker(&self) -> Option<Rc<Worker>> {
        std::mem::take(&mut *self.worker.borrow_mut()).upgrade()
    }

    /// The invocation environment of the operation body
    pub fn env(&self) -> Option<Rc<Env>> {
        self.env.borrow().clone()
    }

    pub fn set_env(&self, env: Rc<Env>) {
        *self.env.borrow_mut() = Some(env);
    }

    /// Drop the invocation environment once the task settles
    ///
    /// The environment binds this task as its call context, so holding it
    /// past completion would keep the pair alive as a cycle.
    pub fn clear_env(&self) {
        *self.env.borrow_mut() = None;
    }

    /// Take the stored resumption, if any
    pub fn take_resumption(&self) -> Option<Resumption> {
        self.resumption.borrow_mut().take()
    }

    /// Take the outcome delivered by the awaited answer
    pub fn take_wake_outcome(&self) -> Option<Outcome> {
        self.wake_outcome.borrow_mut().take()
    }

    fn strong(&self) -> Option<Rc<Task>> {
        self.me.upgrade()
    }
}

impl CallContext for Task {
    fn pause(&self, resumption: Resumption) {
        *self.resumption.borrow_mut() = Some(resumption);
        self.state.set(TaskState::Paused);
        match (self.service.upgrade(), self.strong()) {
            (Some(service), Some(task)) => service.suspend(&task),
            _ => warn!(
                request = self.request.id(),
                "pause with no owning service; resumption parked"
            ),
        }
    }

    fn wake(&self, outcome: Outcome) {
        *self.wake_outcome.borrow_mut() = Some(outcome);
        match (self.service.upgrade(), self.strong()) {
            (Some(service), Some(task)) => service.activate(&task),
            _ => warn!(
                request = self.request.id(),
                "wake with no owning service; outcome dropped"
            ),
        }
    }

    fn events(&self) -> Rc<Dispatcher> {
        Rc::clone(&self.events)
    }

    fn next_request_id(&self) -> u64 {
        self.service
            .upgrade()
            .map_or(0, |service| service.next_request_id())
    }
}

fn request_emission(service: &Rc<Service>) -> Tick {
    service.scheduler().now()
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("request", &self.request.id())
            .field("operation", &self.request.operation())
            .field("state", &self.state.get())
            .field("started", &self.started.get())
            .finish()
    }
}
