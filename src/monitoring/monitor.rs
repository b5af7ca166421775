// src/monitoring/monitor.rs
//! Per-service monitoring
//!
//! A [`ServiceMonitor`] is a listener that accumulates window counters and,
//! when sampled, folds them with instantaneous gauges (queue length,
//! utilization, capacity) into one [`ReportRecord`]. Sampling resets the
//! window, so every rate covers exactly the ticks since the previous sample.

use crate::kernel::clock::Tick;
use crate::monitoring::listener::Listener;
use crate::runtime::service::Service;
use crate::runtime::task::Task;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// One monitoring sample for one service
#[derive(Debug, Clone, Serialize)]
pub struct ReportRecord {
    /// Sampling tick
    pub time: Tick,
    /// Service name
    pub service: String,
    /// Tasks waiting for a worker at sampling time
    pub queue_length: usize,
    /// Busy fraction of the worker pool at sampling time
    pub utilization: f64,
    /// Worker-pool capacity at sampling time
    pub workers: usize,
    /// Requests arrived per tick over the window
    pub arrival_rate: f64,
    /// Requests rejected per tick over the window
    pub rejection_rate: f64,
    /// Successes over settled requests in the window; 1.0 when none settled
    pub reliability: f64,
    /// Successful replies per tick over the window
    pub throughput: f64,
    /// Mean response time of the window's successes, in ticks
    pub mean_response_time: f64,
}

#[derive(Default)]
struct Window {
    arrivals: u64,
    rejections: u64,
    successes: u64,
    failures: u64,
    response_total: u64,
}

/// Window-counting listener for one service
pub struct ServiceMonitor {
    service: Weak<Service>,
    window: RefCell<Window>,
}

impl ServiceMonitor {
    /// Create a monitor and register it on the service's dispatcher
    pub fn install(service: &Rc<Service>) -> Rc<Self> {
        let monitor = Rc::new(Self {
            service: Rc::downgrade(service),
            window: RefCell::new(Window::default()),
        });
        service
            .dispatcher()
            .register(Rc::clone(&monitor) as Rc<dyn Listener>);
        monitor
    }

    /// Fold the window into a record and reset it
    ///
    /// Returns `None` once the monitored service is gone.
    pub fn sample(&self, time: Tick, period: Tick) -> Option<ReportRecord> {
        let service = self.service.upgrade()?;
        let window = std::mem::take(&mut *self.window.borrow_mut());
        let ticks = period.max(1) as f64;
        let settled = window.successes + window.failures;
        Some(ReportRecord {
            time,
            service: service.name().to_string(),
            queue_length: service.queue().size(),
            utilization: service.workers().utilization(),
            workers: service.workers().capacity(),
            arrival_rate: window.arrivals as f64 / ticks,
            rejection_rate: window.rejections as f64 / ticks,
            reliability: if settled == 0 {
                1.0
            } else {
                window.successes as f64 / settled as f64
            },
            throughput: window.successes as f64 / ticks,
            mean_response_time: if window.successes == 0 {
                0.0
            } else {
                window.response_total as f64 / window.successes as f64
            },
        })
    }
}

impl Listener for ServiceMonitor {
    fn task_created(&self, _task: &Rc<Task>) {
        self.window.borrow_mut().arrivals += 1;
    }

    fn task_rejected(&self, _task: &Rc<Task>) {
        self.window.borrow_mut().rejections += 1;
    }

    fn task_successful(&self, task: &Rc<Task>) {
        let mut window = self.window.borrow_mut();
        window.successes += 1;
        window.response_total += task.request().response_time().unwrap_or(0);
    }

    fn task_failed(&self, _task: &Rc<Task>) {
        self.window.borrow_mut().failures += 1;
    }
}
