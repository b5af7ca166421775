// src/runtime/evaluator.rs
//! Continuation-passing evaluation of behavior trees
//!
//! Nothing in a behavior body may block the host thread, so every node is
//! evaluated in continuation-passing style: `evaluate` returns an immediate
//! [`Outcome`] describing where the evaluation stands *right now*, and the
//! continuation `k` is invoked exactly once with the final Success or Error
//! when the node settles.
//!
//! The immediate outcome encodes three situations:
//! - `Success`/`Error`: the node settled synchronously; `k` has already run.
//! - `Busy`: the node holds its worker while logical time passes (Think,
//!   a retry waiting out its backoff).
//! - `Paused`: the node gave its worker back and waits on a remote answer
//!   (Trigger awaiting acknowledgement, Query awaiting a reply).
//!
//! Calls reach the caller through the `%context` binding in the evaluation
//! environment: a worker-bound task or a client emission, both behind the
//! [`CallContext`] trait. Who pays the transmission delay differs by call
//! kind: a Trigger crosses the wire in one tick; a Query is delivered on the
//! sending tick so that queueing at the target is the only source of lag.

use crate::kernel::env::{Env, Value};
use crate::kernel::scheduler::Scheduler;
use crate::model::behavior::Behavior;
use crate::runtime::backoff::BackoffStrategy;
use crate::runtime::request::Request;
use crate::runtime::service::Service;
use crate::runtime::task::CallContext;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, error, trace};

/// Where an evaluation stands
#[derive(Clone)]
pub enum Outcome {
    /// Settled successfully, possibly carrying a value
    Success(Option<Value>),
    /// Settled with a failure
    Error,
    /// Waiting on a remote answer; the worker has been released
    Paused,
    /// Occupying the worker while scheduled work elapses
    Busy,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success(_) => write!(f, "Success"),
            Outcome::Error => write!(f, "Error"),
            Outcome::Paused => write!(f, "Paused"),
            Outcome::Busy => write!(f, "Busy"),
        }
    }
}

/// Continuation receiving the final outcome of a node
pub type Continuation = Rc<dyn Fn(Outcome)>;

/// One-shot closure resuming a paused evaluation
pub type Resumption = Box<dyn FnOnce(Outcome)>;

/// Behavior-tree evaluator
///
/// Owns its own rng stream so that probabilistic nodes (Fail, jittered
/// backoff) are reproducible independently of event tie-breaking.
pub struct Evaluator {
    scheduler: Rc<Scheduler>,
    root: Rc<Env>,
    rng: RefCell<SmallRng>,
}

impl Evaluator {
    pub fn new(scheduler: &Rc<Scheduler>, root: &Rc<Env>, seed: u64) -> Rc<Self> {
        Rc::new(Self {
            scheduler: Rc::clone(scheduler),
            root: Rc::clone(root),
            rng: RefCell::new(SmallRng::seed_from_u64(seed)),
        })
    }

    pub fn root(&self) -> &Rc<Env> {
        &self.root
    }

    /// Evaluate one node
    ///
    /// `k` fires exactly once with the final Success or Error; the return
    /// value reports how far evaluation got synchronously.
    pub fn evaluate(self: &Rc<Self>, env: &Rc<Env>, behavior: &Rc<Behavior>, k: Continuation) -> Outcome {
        match &**behavior {
            Behavior::Sequence(steps) => self.eval_sequence(env, Rc::new(steps.clone()), 0, k),
            Behavior::Think { duration } => self.eval_think(env, *duration, k),
            Behavior::Fail { probability } => self.eval_fail(*probability, k),
            Behavior::IgnoreError { body } => self.eval_ignore_error(env, body, k),
            Behavior::Retry {
                body,
                limit,
                backoff,
            } => self.eval_retry(env, Rc::clone(body), *limit, *backoff, 0, k),
            Behavior::Trigger {
                service,
                operation,
                priority,
            } => self.eval_trigger(env, service, operation, *priority, k),
            Behavior::Query {
                service,
                operation,
                priority,
                timeout,
            } => self.eval_query(env, service, operation, *priority, *timeout, k),
        }
    }

    /// Steps run left to right; a step's Error fails the whole sequence.
    ///
    /// Steps that settle synchronously are chained in a loop; the first step
    /// that goes Busy or Paused hands the rest of the walk to its
    /// continuation.
    fn eval_sequence(
        self: &Rc<Self>,
        env: &Rc<Env>,
        steps: Rc<Vec<Rc<Behavior>>>,
        start: usize,
        k: Continuation,
    ) -> Outcome {
        let mut index = start;
        loop {
            if index == steps.len() {
                k(Outcome::Success(None));
                return Outcome::Success(None);
            }

            // Distinguishes a continuation invoked during evaluate() from
            // one invoked later by the scheduler.
            let in_evaluate = Rc::new(Cell::new(true));
            let settled = Rc::new(RefCell::new(None::<Outcome>));

            let step_k: Continuation = {
                let this = Rc::clone(self);
                let env = Rc::clone(env);
                let steps = Rc::clone(&steps);
                let k = Rc::clone(&k);
                let in_evaluate = Rc::clone(&in_evaluate);
                let settled = Rc::clone(&settled);
                let next = index + 1;
                Rc::new(move |outcome: Outcome| {
                    if in_evaluate.get() {
                        *settled.borrow_mut() = Some(outcome);
                    } else if outcome.is_success() {
                        let _ = this.eval_sequence(&env, Rc::clone(&steps), next, Rc::clone(&k));
                    } else {
                        k(Outcome::Error);
                    }
                })
            };

            let immediate = self.evaluate(env, &steps[index], step_k);
            in_evaluate.set(false);

            let Some(outcome) = settled.borrow_mut().take() else {
                // Step in flight; its continuation owns the rest
                return immediate;
            };
            if !outcome.is_success() {
                k(Outcome::Error);
                return Outcome::Error;
            }
            index += 1;
        }
    }

    fn eval_think(
        &self,
        env: &Rc<Env>,
        duration: crate::kernel::clock::Tick,
        k: Continuation,
    ) -> Outcome {
        // The executing worker, if any, sits on the dynamic chain; client
        // emissions think without one.
        let worker = env.executing_worker().map(|worker| worker.id());
        trace!(duration, worker, "think");
        self.scheduler
            .schedule_after(duration, Box::new(move || k(Outcome::Success(None))));
        Outcome::Busy
    }

    fn eval_fail(&self, probability: f64, k: Continuation) -> Outcome {
        let roll: f64 = self.rng.borrow_mut().gen();
        if roll < probability {
            k(Outcome::Error);
            Outcome::Error
        } else {
            k(Outcome::Success(None));
            Outcome::Success(None)
        }
    }

    fn eval_ignore_error(self: &Rc<Self>, env: &Rc<Env>, body: &Rc<Behavior>, k: Continuation) -> Outcome {
        let inner: Continuation = Rc::new(move |outcome: Outcome| match outcome {
            Outcome::Error => k(Outcome::Success(None)),
            other => k(other),
        });
        match self.evaluate(env, body, inner) {
            Outcome::Error => Outcome::Success(None),
            other => other,
        }
    }

    fn eval_retry(
        self: &Rc<Self>,
        env: &Rc<Env>,
        body: Rc<Behavior>,
        limit: u32,
        backoff: BackoffStrategy,
        attempt: u32,
        k: Continuation,
    ) -> Outcome {
        let in_evaluate = Rc::new(Cell::new(true));
        let settled = Rc::new(RefCell::new(None::<Outcome>));

        let attempt_k: Continuation = {
            let this = Rc::clone(self);
            let env = Rc::clone(env);
            let body = Rc::clone(&body);
            let k = Rc::clone(&k);
            let in_evaluate = Rc::clone(&in_evaluate);
            let settled = Rc::clone(&settled);
            Rc::new(move |outcome: Outcome| {
                if in_evaluate.get() {
                    *settled.borrow_mut() = Some(outcome);
                } else {
                    this.settle_attempt(&env, &body, limit, backoff, attempt, &k, outcome);
                }
            })
        };

        let immediate = self.evaluate(env, &body, attempt_k);
        in_evaluate.set(false);

        let Some(outcome) = settled.borrow_mut().take() else {
            return immediate;
        };
        if outcome.is_success() {
            k(outcome);
            return Outcome::Success(None);
        }
        let failures = attempt + 1;
        if failures >= limit {
            k(Outcome::Error);
            return Outcome::Error;
        }
        self.schedule_reattempt(env, &body, limit, backoff, failures, &k);
        Outcome::Busy
    }

    /// Final outcome of an attempt that settled after `evaluate` returned
    fn settle_attempt(
        self: &Rc<Self>,
        env: &Rc<Env>,
        body: &Rc<Behavior>,
        limit: u32,
        backoff: BackoffStrategy,
        attempt: u32,
        k: &Continuation,
        outcome: Outcome,
    ) {
        if outcome.is_success() {
            k(outcome);
            return;
        }
        let failures = attempt + 1;
        if failures >= limit {
            debug!(limit, "retry budget exhausted");
            k(Outcome::Error);
            return;
        }
        self.schedule_reattempt(env, body, limit, backoff, failures, k);
    }

    fn schedule_reattempt(
        self: &Rc<Self>,
        env: &Rc<Env>,
        body: &Rc<Behavior>,
        limit: u32,
        backoff: BackoffStrategy,
        failures: u32,
        k: &Continuation,
    ) {
        let delay = backoff.delay(failures - 1, &mut self.rng.borrow_mut());
        trace!(failures, delay, "retrying after backoff");
        let this = Rc::clone(self);
        let env = Rc::clone(env);
        let body = Rc::clone(body);
        let k = Rc::clone(k);
        self.scheduler.schedule_after(
            delay,
            Box::new(move || {
                let _ = this.eval_retry(&env, body, limit, backoff, failures, k);
            }),
        );
    }

    /// Resolve a call's target service and the caller's context
    fn call_parties(
        &self,
        env: &Rc<Env>,
        service: &str,
        operation: &str,
    ) -> Option<(Rc<Service>, Rc<dyn CallContext>)> {
        let Some(target) = env.lookup(service).and_then(|value| value.as_service()) else {
            error!(service, operation, "call target not bound");
            return None;
        };
        let Some(context) = env.call_context() else {
            error!(service, operation, "call with no calling context in scope");
            return None;
        };
        Some((target, context))
    }

    /// Fire-and-forget: the caller pauses only until the target acknowledges
    /// admission. Acceptance resumes with Success, rejection with Error; the
    /// eventual reply is observed by listeners but does not resume anyone.
    fn eval_trigger(
        self: &Rc<Self>,
        env: &Rc<Env>,
        service: &str,
        operation: &str,
        priority: i64,
        k: Continuation,
    ) -> Outcome {
        let Some((target, context)) = self.call_parties(env, service, operation) else {
            k(Outcome::Error);
            return Outcome::Error;
        };
        let events = context.events();
        let request = Request::new(
            context.next_request_id(),
            operation,
            priority,
            self.scheduler.now(),
        );
        events.posting_of(target.name(), &request);

        {
            let ack_events = Rc::clone(&events);
            let ack_context = Rc::clone(&context);
            let reply_events = Rc::clone(&events);
            request.install_hooks(
                Box::new(move |request, accepted| {
                    if accepted {
                        ack_events.acceptance_of(request);
                        ack_context.wake(Outcome::Success(None));
                    } else {
                        ack_events.rejection_of(request);
                        ack_context.wake(Outcome::Error);
                    }
                }),
                Box::new(move |request, success| {
                    if success {
                        reply_events.success_of(request);
                    } else {
                        reply_events.failure_of(request);
                    }
                }),
            );
        }

        context.pause(Box::new(move |outcome| k(outcome)));

        // One tick of transmission before the target sees it
        let request = Rc::clone(&request);
        self.scheduler
            .schedule_after(1, Box::new(move || target.process(request)));
        Outcome::Paused
    }

    /// Blocking call: the caller pauses until the reply, a rejection, or its
    /// own timeout, whichever settles the request first.
    fn eval_query(
        self: &Rc<Self>,
        env: &Rc<Env>,
        service: &str,
        operation: &str,
        priority: i64,
        timeout: Option<crate::kernel::clock::Tick>,
        k: Continuation,
    ) -> Outcome {
        let Some((target, context)) = self.call_parties(env, service, operation) else {
            k(Outcome::Error);
            return Outcome::Error;
        };
        let events = context.events();
        let request = Request::new(
            context.next_request_id(),
            operation,
            priority,
            self.scheduler.now(),
        );
        events.posting_of(target.name(), &request);

        {
            let ack_events = Rc::clone(&events);
            let ack_context = Rc::clone(&context);
            let reply_events = Rc::clone(&events);
            let reply_context = Rc::clone(&context);
            request.install_hooks(
                Box::new(move |request, accepted| {
                    if accepted {
                        ack_events.acceptance_of(request);
                    } else {
                        ack_events.rejection_of(request);
                        ack_context.wake(Outcome::Error);
                    }
                }),
                Box::new(move |request, success| {
                    if success {
                        reply_events.success_of(request);
                        reply_context.wake(Outcome::Success(None));
                    } else {
                        reply_events.failure_of(request);
                        reply_context.wake(Outcome::Error);
                    }
                }),
            );
        }

        context.pause(Box::new(move |outcome| k(outcome)));

        if let Some(timeout) = timeout {
            let timed_events = Rc::clone(&events);
            let timed_context = Rc::clone(&context);
            let timed_request = Rc::clone(&request);
            self.scheduler.schedule_after(
                timeout,
                Box::new(move || {
                    if timed_request.is_pending() {
                        debug!(request = timed_request.id(), timeout, "query timed out");
                        timed_request.fail();
                        timed_events.timeout_of(&timed_request);
                        timed_context.wake(Outcome::Error);
                    }
                }),
            );
        }

        // Delivered on the sending tick: queueing at the target is the only
        // source of lag for a query
        target.process(request);
        Outcome::Paused
    }
}
