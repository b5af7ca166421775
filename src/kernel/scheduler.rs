// src/kernel/scheduler.rs
//! Event scheduler
//!
//! The scheduler owns the logical clock and the pool of pending events. It is
//! the single driver of the simulation: `run_until` repeatedly pops the
//! earliest-due event, advances the clock to its due time, and fires it.
//!
//! Events sharing a due time are fired in *randomized* order on each run —
//! concurrent logical events are deliberately not ordered by insertion, so
//! that correctness can never lean on the relative order of simultaneous
//! events. The shuffle is driven by a seeded `SmallRng`, which keeps whole
//! runs reproducible.
//!
//! Firing an event must not block: continuations return promptly and schedule
//! further events for anything that would otherwise take time.

use crate::kernel::clock::{Clock, Tick};
use crate::utils::errors::{EngineError, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::trace;

/// A scheduled continuation
pub type EventFn = Box<dyn FnOnce()>;

struct SchedulerState {
    clock: Clock,
    // due time -> events due at that tick; bucket order is irrelevant, the
    // firing index is drawn from the rng
    queue: BTreeMap<Tick, Vec<EventFn>>,
    rng: SmallRng,
    scheduled: u64,
    fired: u64,
}

/// Scheduler owning the logical clock and the pending-event pool
pub struct Scheduler {
    state: RefCell<SchedulerState>,
}

impl Scheduler {
    /// Create a scheduler with a seeded tie-break shuffle
    pub fn new(seed: u64) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(SchedulerState {
                clock: Clock::new(),
                queue: BTreeMap::new(),
                rng: SmallRng::seed_from_u64(seed),
                scheduled: 0,
                fired: 0,
            }),
        })
    }

    /// Current logical time
    pub fn now(&self) -> Tick {
        self.state.borrow().clock.now()
    }

    /// Number of events fired so far
    pub fn fired(&self) -> u64 {
        self.state.borrow().fired
    }

    /// True if no events are pending
    pub fn is_idle(&self) -> bool {
        self.state.borrow().queue.is_empty()
    }

    /// Schedule an event at an absolute time
    ///
    /// Fails with `PastEvent` if `due` already passed. Scheduling at the
    /// current tick is allowed: the event joins the current tick's bucket and
    /// fires after the running continuation returns.
    pub fn schedule_at(&self, due: Tick, event: EventFn) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let now = state.clock.now();
        if due < now {
            return Err(EngineError::PastEvent { due, now });
        }
        state.queue.entry(due).or_default().push(event);
        state.scheduled += 1;
        Ok(())
    }

    /// Schedule an event `delay` ticks from now
    pub fn schedule_after(&self, delay: Tick, event: EventFn) {
        let mut state = self.state.borrow_mut();
        let due = state.clock.now().saturating_add(delay);
        state.queue.entry(due).or_default().push(event);
        state.scheduled += 1;
    }

    /// Schedule a callback that re-arms itself every `period` ticks
    ///
    /// The first firing happens one period from now. The callback receives
    /// the tick at which it fires.
    pub fn schedule_every<F>(self: &Rc<Self>, period: Tick, callback: F)
    where
        F: FnMut(Tick) + 'static,
    {
        fn arm(scheduler: &Rc<Scheduler>, period: Tick, callback: Rc<RefCell<dyn FnMut(Tick)>>) {
            let again = Rc::clone(scheduler);
            scheduler.schedule_after(
                period,
                Box::new(move || {
                    let now = again.now();
                    (callback.borrow_mut())(now);
                    arm(&again, period, callback);
                }),
            );
        }
        arm(self, period.max(1), Rc::new(RefCell::new(callback)));
    }

    /// Run until the pool is empty or the next due time exceeds `limit`
    ///
    /// Returns the number of events fired.
    pub fn run_until(&self, limit: Tick) -> Result<u64> {
        self.run_until_with(limit, |_| {})
    }

    /// Like [`run_until`](Self::run_until), invoking `progress` each time the
    /// clock advances to a new tick
    pub fn run_until_with<F>(&self, limit: Tick, mut progress: F) -> Result<u64>
    where
        F: FnMut(Tick),
    {
        let start = self.state.borrow().fired;
        loop {
            let (event, advanced, due) = {
                let mut state = self.state.borrow_mut();
                let due = match state.queue.keys().next().copied() {
                    Some(due) if due <= limit => due,
                    _ => break,
                };
                let SchedulerState {
                    clock, queue, rng, ..
                } = &mut *state;
                let advanced = due > clock.now();
                if advanced {
                    clock.advance_to(due)?;
                }
                let Some(bucket) = queue.get_mut(&due) else {
                    break;
                };
                let index = if bucket.len() > 1 {
                    rng.gen_range(0..bucket.len())
                } else {
                    0
                };
                let event = bucket.swap_remove(index);
                if bucket.is_empty() {
                    queue.remove(&due);
                }
                state.fired += 1;
                (event, advanced, due)
            };
            if advanced {
                trace!(tick = due, "clock advanced");
                progress(due);
            }
            event();
        }
        Ok(self.state.borrow().fired - start)
    }
}
