// src/runtime/request.rs
//! In-flight requests
//!
//! A request is the wire-level unit of work exchanged between entities.
//! Identifiers are assigned monotonically by the *sender's* generator, so ids
//! are unique per caller, not globally. Status transitions are guarded: once
//! a request is terminal, late replies and stale resumptions observe
//! `is_pending() == false` and back off.

use crate::kernel::clock::Tick;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Lifecycle status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Created, not yet acknowledged by the target
    Pending,
    /// Admitted by the target (assigned or queued)
    Accepted,
    /// Turned away by admission control
    Rejected,
    /// Replied successfully
    Success,
    /// Failed, timed out, or errored downstream
    Error,
}

/// Acknowledgement hook installed by the sender; receives `true` on
/// acceptance, `false` on rejection
pub type AckHook = Box<dyn FnOnce(&Rc<Request>, bool)>;

/// Reply hook installed by the sender; receives `true` on Success
pub type ReplyHook = Box<dyn FnOnce(&Rc<Request>, bool)>;

/// One request sent to a service operation
pub struct Request {
    id: u64,
    operation: String,
    priority: i64,
    emission: Tick,
    status: Cell<RequestStatus>,
    response_time: Cell<Option<Tick>>,
    on_ack: RefCell<Option<AckHook>>,
    on_reply: RefCell<Option<ReplyHook>>,
}

impl Request {
    pub fn new(id: u64, operation: impl Into<String>, priority: i64, emission: Tick) -> Rc<Self> {
        Rc::new(Self {
            id,
            operation: operation.into(),
            priority,
            emission,
            status: Cell::new(RequestStatus::Pending),
            response_time: Cell::new(None),
            on_ack: RefCell::new(None),
            on_reply: RefCell::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn emission(&self) -> Tick {
        self.emission
    }

    pub fn status(&self) -> RequestStatus {
        self.status.get()
    }

    /// True while no terminal status has been recorded
    pub fn is_pending(&self) -> bool {
        matches!(
            self.status.get(),
            RequestStatus::Pending | RequestStatus::Accepted
        )
    }

    /// Response time, defined iff the request succeeded
    pub fn response_time(&self) -> Option<Tick> {
        self.response_time.get()
    }

    /// Install sender-side hooks
    pub fn install_hooks(&self, on_ack: AckHook, on_reply: ReplyHook) {
        *self.on_ack.borrow_mut() = Some(on_ack);
        *self.on_reply.borrow_mut() = Some(on_reply);
    }

    /// Record the admission decision
    pub fn acknowledge(&self, accepted: bool) {
        self.status.set(if accepted {
            RequestStatus::Accepted
        } else {
            RequestStatus::Rejected
        });
    }

    /// Record a successful reply at `reply_time`
    ///
    /// `response_time` is exactly `reply_time - emission_time`, and is only
    /// ever defined on Success.
    pub fn succeed(&self, reply_time: Tick) {
        self.status.set(RequestStatus::Success);
        self.response_time.set(Some(reply_time - self.emission));
    }

    /// Record a failed reply or timeout
    pub fn fail(&self) {
        self.status.set(RequestStatus::Error);
    }

    /// Take the acknowledgement hook, if still installed
    pub fn take_ack_hook(&self) -> Option<AckHook> {
        self.on_ack.borrow_mut().take()
    }

    /// Take the reply hook, if still installed
    pub fn take_reply_hook(&self) -> Option<ReplyHook> {
        self.on_reply.borrow_mut().take()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("priority", &self.priority)
            .field("emission", &self.emission)
            .field("status", &self.status.get())
            .field("response_time", &self.response_time.get())
            .finish()
    }
}
