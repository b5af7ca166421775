// src/monitoring/listener.rs
//! Lifecycle listeners and the per-entity dispatcher
//!
//! Services and client stubs fan out lifecycle notifications to any number
//! of registered listeners. The `task_*` family fires on the receiving side
//! of a call; the `*_of` family fires on the sending side. Every event
//! reaches every registered listener exactly once per occurrence.

use crate::runtime::request::Request;
use crate::runtime::task::Task;
use std::cell::RefCell;
use std::rc::Rc;

/// Observer of request/task lifecycle events
///
/// Every method has a no-op default, so listeners implement only what they
/// care about.
#[allow(unused_variables)]
pub trait Listener {
    // Receiving side
    fn task_created(&self, task: &Rc<Task>) {}
    fn task_accepted(&self, task: &Rc<Task>) {}
    fn task_rejected(&self, task: &Rc<Task>) {}
    fn task_assigned_to(&self, task: &Rc<Task>, worker: u64) {}
    fn task_activated(&self, task: &Rc<Task>) {}
    fn task_successful(&self, task: &Rc<Task>) {}
    fn task_failed(&self, task: &Rc<Task>) {}
    fn task_cancelled(&self, task: &Rc<Task>) {}

    // Sending side
    fn posting_of(&self, target: &str, request: &Rc<Request>) {}
    fn acceptance_of(&self, request: &Rc<Request>) {}
    fn rejection_of(&self, request: &Rc<Request>) {}
    fn success_of(&self, request: &Rc<Request>) {}
    fn failure_of(&self, request: &Rc<Request>) {}
    fn timeout_of(&self, request: &Rc<Request>) {}
}

/// Fan-out of lifecycle notifications to registered listeners
#[derive(Default)]
pub struct Dispatcher {
    listeners: RefCell<Vec<Rc<dyn Listener>>>,
}

macro_rules! fan_out {
    ($name:ident, $($arg:ident : $ty:ty),*) => {
        pub fn $name(&self, $($arg: $ty),*) {
            for listener in self.listeners.borrow().iter() {
                listener.$name($($arg),*);
            }
        }
    };
}

impl Dispatcher {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Register a listener; it will see every subsequent event once
    pub fn register(&self, listener: Rc<dyn Listener>) {
        self.listeners.borrow_mut().push(listener);
    }

    fan_out!(task_created, task: &Rc<Task>);
    fan_out!(task_accepted, task: &Rc<Task>);
    fan_out!(task_rejected, task: &Rc<Task>);
    fan_out!(task_assigned_to, task: &Rc<Task>, worker: u64);
    fan_out!(task_activated, task: &Rc<Task>);
    fan_out!(task_successful, task: &Rc<Task>);
    fan_out!(task_failed, task: &Rc<Task>);
    fan_out!(task_cancelled, task: &Rc<Task>);
    fan_out!(posting_of, target: &str, request: &Rc<Request>);
    fan_out!(acceptance_of, request: &Rc<Request>);
    fan_out!(rejection_of, request: &Rc<Request>);
    fan_out!(success_of, request: &Rc<Request>);
    fan_out!(failure_of, request: &Rc<Request>);
    fan_out!(timeout_of, request: &Rc<Request>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Counter {
        seen: Cell<u64>,
    }

    impl Listener for Counter {
        fn acceptance_of(&self, _request: &Rc<Request>) {
            self.seen.set(self.seen.get() + 1);
        }
    }

    #[test]
    fn test_every_listener_sees_each_event_once() {
        let dispatcher = Dispatcher::new();
        let first = Rc::new(Counter::default());
        let second = Rc::new(Counter::default());
        dispatcher.register(Rc::clone(&first) as Rc<dyn Listener>);
        dispatcher.register(Rc::clone(&second) as Rc<dyn Listener>);

        let request = Request::new(1, "op", 0, 0);
        dispatcher.acceptance_of(&request);
        dispatcher.acceptance_of(&request);

        assert_eq!(first.seen.get(), 2);
        assert_eq!(second.seen.get(), 2);
    }
}
