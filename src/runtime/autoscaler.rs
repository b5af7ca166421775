// src/runtime/autoscaler.rs
//! Periodic worker-pool capacity control
//!
//! The autoscaler samples a service's load every `period` ticks, asks its
//! strategy for a desired capacity, clamps the proposal into the configured
//! `[min, max]` band, and resizes the worker pool. The clamp is applied to
//! every proposal without exception, so a runaway strategy can never push a
//! pool outside its band.

use crate::model::program::AutoScalerSpec;
use crate::runtime::service::Service;
use std::rc::Rc;
use tracing::debug;

/// One sampled view of a service's load
#[derive(Debug, Clone, Copy)]
pub struct LoadSnapshot {
    pub capacity: usize,
    pub busy: usize,
    pub queued: usize,
    pub utilization: f64,
}

/// Maps a load snapshot to a desired worker count
///
/// Proposals are advisory: the autoscaler clamps them into its band before
/// applying.
pub trait ScalingStrategy {
    fn desired(&self, snapshot: &LoadSnapshot) -> usize;
}

/// Step-up / step-down scaling on utilization thresholds
///
/// Proposes one more worker when utilization exceeds `high`, one fewer when
/// it drops below `low`, and the current capacity otherwise. Utilization
/// exactly at a threshold leaves the capacity alone.
pub struct RuleBasedStrategy {
    low: f64,
    high: f64,
}

impl RuleBasedStrategy {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }
}

impl ScalingStrategy for RuleBasedStrategy {
    fn desired(&self, snapshot: &LoadSnapshot) -> usize {
        if snapshot.utilization > self.high {
            snapshot.capacity + 1
        } else if snapshot.utilization < self.low {
            snapshot.capacity.saturating_sub(1)
        } else {
            snapshot.capacity
        }
    }
}

/// Attach the capacity-control loop described by `spec` to `service`
///
/// The first adjustment happens one period after attachment. The loop holds
/// only a weak handle, so it dies with the service.
pub fn attach(service: &Rc<Service>, spec: AutoScalerSpec) {
    let AutoScalerSpec {
        period,
        min,
        max,
        strategy,
    } = spec;
    let handle = Rc::downgrade(service);
    service.scheduler().schedule_every(period, move |tick| {
        let Some(service) = handle.upgrade() else {
            return;
        };
        let workers = service.workers();
        let snapshot = LoadSnapshot {
            capacity: workers.capacity(),
            busy: workers.busy_count(),
            queued: service.queue().size(),
            utilization: workers.utilization(),
        };
        let proposal = strategy.desired(&snapshot);
        let target = proposal.clamp(min, max);
        if target != snapshot.capacity {
            debug!(
                service = service.name(),
                tick,
                utilization = snapshot.utilization,
                proposal,
                target,
                "autoscaler resizing"
            );
            workers.set_capacity(target);
        }
    });
}
