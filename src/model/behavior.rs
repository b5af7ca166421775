// src/model/behavior.rs
//! Behavior trees
//!
//! The parsed representation of what an operation or client stub does. The
//! evaluator walks these nodes in continuation-passing style; nothing here
//! executes anything by itself.
//!
//! Constructors perform the configuration checks the front end cannot:
//! a retry limit below one or an out-of-range failure probability is an
//! `InvalidConfiguration` error at build time, never a runtime surprise.

use crate::kernel::clock::Tick;
use crate::runtime::backoff::BackoffStrategy;
use crate::utils::errors::{EngineError, Result};
use std::rc::Rc;

/// One node of a behavior tree
#[derive(Debug)]
pub enum Behavior {
    /// Evaluate sub-expressions left to right, short-circuiting on Error
    Sequence(Vec<Rc<Behavior>>),

    /// Local computation occupying the worker for `duration` ticks
    Think { duration: Tick },

    /// Non-blocking call: resume once the target acknowledges
    Trigger {
        service: String,
        operation: String,
        priority: i64,
    },

    /// Blocking call: resume on reply, or on timeout if one is set
    Query {
        service: String,
        operation: String,
        priority: i64,
        timeout: Option<Tick>,
    },

    /// Resolve to Error with the given probability
    Fail { probability: f64 },

    /// Re-evaluate `body` on Error, up to `limit` total attempts
    Retry {
        body: Rc<Behavior>,
        limit: u32,
        backoff: BackoffStrategy,
    },

    /// Convert Error to Success, passing Success through unchanged
    IgnoreError { body: Rc<Behavior> },
}

impl Behavior {
    /// Sequence of steps evaluated left to right
    pub fn sequence(steps: Vec<Behavior>) -> Behavior {
        Behavior::Sequence(steps.into_iter().map(Rc::new).collect())
    }

    /// Local computation for `duration` ticks
    pub fn think(duration: Tick) -> Behavior {
        Behavior::Think { duration }
    }

    /// Fire-and-forget call at default priority
    pub fn trigger(service: impl Into<String>, operation: impl Into<String>) -> Behavior {
        Behavior::Trigger {
            service: service.into(),
            operation: operation.into(),
            priority: 0,
        }
    }

    /// Blocking call at default priority with no timeout
    pub fn query(service: impl Into<String>, operation: impl Into<String>) -> Behavior {
        Behavior::query_with(service, operation, 0, None)
    }

    /// Blocking call with explicit priority and optional timeout
    pub fn query_with(
        service: impl Into<String>,
        operation: impl Into<String>,
        priority: i64,
        timeout: Option<Tick>,
    ) -> Behavior {
        Behavior::Query {
            service: service.into(),
            operation: operation.into(),
            priority,
            timeout,
        }
    }

    /// Fire-and-forget call with explicit priority
    pub fn trigger_with(
        service: impl Into<String>,
        operation: impl Into<String>,
        priority: i64,
    ) -> Behavior {
        Behavior::Trigger {
            service: service.into(),
            operation: operation.into(),
            priority,
        }
    }

    /// Random failure with probability in `[0, 1]`
    pub fn fail(probability: f64) -> Result<Behavior> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(EngineError::InvalidConfiguration(format!(
                "failure probability must be within [0, 1], got {probability}"
            )));
        }
        Ok(Behavior::Fail { probability })
    }

    /// Retry wrapper; `limit` counts total attempts and must be at least 1
    pub fn retry(body: Behavior, limit: u32, backoff: BackoffStrategy) -> Result<Behavior> {
        if limit < 1 {
            return Err(EngineError::InvalidConfiguration(
                "retry limit must be >= 1".into(),
            ));
        }
        Ok(Behavior::Retry {
            body: Rc::new(body),
            limit,
            backoff,
        })
    }

    /// Swallow Error outcomes from `body`
    pub fn ignore_error(body: Behavior) -> Behavior {
        Behavior::IgnoreError {
            body: Rc::new(body),
        }
    }

    /// Visit every remote call in the tree as `(service, operation)`
    ///
    /// Used by load-time validation to reject references to names that were
    /// never defined.
    pub fn for_each_call(&self, visit: &mut impl FnMut(&str, &str)) {
        match self {
            Behavior::Sequence(steps) => {
                for step in steps {
                    step.for_each_call(visit);
                }
            }
            Behavior::Trigger {
                service, operation, ..
            }
            | Behavior::Query {
                service, operation, ..
            } => visit(service, operation),
            Behavior::Retry { body, .. } | Behavior::IgnoreError { body } => {
                body.for_each_call(visit);
            }
            Behavior::Think { .. } | Behavior::Fail { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_limit_zero_rejected() {
        let err = Behavior::retry(Behavior::think(1), 0, BackoffStrategy::constant(1)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_retry_limit_one_accepted() {
        assert!(Behavior::retry(Behavior::think(1), 1, BackoffStrategy::constant(1)).is_ok());
    }

    #[test]
    fn test_fail_probability_bounds() {
        assert!(Behavior::fail(0.0).is_ok());
        assert!(Behavior::fail(1.0).is_ok());
        assert!(Behavior::fail(1.5).is_err());
        assert!(Behavior::fail(-0.1).is_err());
    }

    #[test]
    fn test_for_each_call_walks_nested_trees() {
        let tree = Behavior::sequence(vec![
            Behavior::think(2),
            Behavior::retry(
                Behavior::query("backend", "lookup"),
                3,
                BackoffStrategy::constant(1),
            )
            .unwrap(),
            Behavior::ignore_error(Behavior::trigger("audit", "log")),
        ]);

        let mut calls = Vec::new();
        tree.for_each_call(&mut |service, operation| {
            calls.push(format!("{service}::{operation}"));
        });
        assert_eq!(calls, vec!["backend::lookup", "audit::log"]);
    }
}
