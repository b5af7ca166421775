// src/runtime/task_pool.rs
//! Task pools
//!
//! The ordered holding area between request arrival and worker assignment.
//! A pool partitions its tasks into three disjoint sets:
//!
//! - **pending**: fresh arrivals, ordered by priority then FIFO/LIFO
//! - **paused**: awaiting a downstream answer; invisible to `size` and never
//!   eligible for assignment
//! - **reactivated**: the answer arrived; served ahead of pending arrivals of
//!   equal priority
//!
//! The trait is the seam where admission policies stack: a throttling
//! decorator holds another `TaskPool` implementer and intercepts `put`.

use crate::runtime::task::{Task, TaskState};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

/// Tie-break order for tasks of equal priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Discipline {
    #[default]
    Fifo,
    Lifo,
}

/// Capability interface of a task pool
pub trait TaskPool {
    /// Offer a fresh task; `false` means admission control rejected it and
    /// the task never entered the pool
    fn put(&self, task: Rc<Task>) -> bool;

    /// Remove the task most eligible for assignment, if any
    fn take(&self) -> Option<Rc<Task>>;

    /// Number of assignable tasks (pending + reactivated; paused excluded)
    fn size(&self) -> usize;

    /// Move an assigned task into the paused set
    fn pause(&self, task: &Rc<Task>);

    /// Move a paused task into the reactivated set
    fn activate(&self, task: &Rc<Task>);
}

#[derive(Default)]
struct PoolState {
    pending: BTreeMap<i64, VecDeque<Rc<Task>>>,
    reactivated: BTreeMap<i64, VecDeque<Rc<Task>>>,
    paused: Vec<Rc<Task>>,
}

impl PoolState {
    fn count(queues: &BTreeMap<i64, VecDeque<Rc<Task>>>) -> usize {
        queues.values().map(VecDeque::len).sum()
    }
}

/// Priority queue with FIFO/LIFO tie-break and a reactivated fast lane
pub struct PriorityTaskPool {
    discipline: Discipline,
    state: RefCell<PoolState>,
}

impl PriorityTaskPool {
    pub fn new(discipline: Discipline) -> Rc<Self> {
        Rc::new(Self {
            discipline,
            state: RefCell::new(PoolState::default()),
        })
    }

    fn pop(&self, queues: &mut BTreeMap<i64, VecDeque<Rc<Task>>>) -> Option<Rc<Task>> {
        // Highest priority first
        let (&priority, _) = queues.iter().next_back()?;
        let queue = queues.get_mut(&priority)?;
        let task = match self.discipline {
            Discipline::Fifo => queue.pop_front(),
            Discipline::Lifo => queue.pop_back(),
        };
        if queue.is_empty() {
            queues.remove(&priority);
        }
        task
    }
}

impl TaskPool for PriorityTaskPool {
    fn put(&self, task: Rc<Task>) -> bool {
        let priority = task.request().priority();
        task.set_state(TaskState::Queued);
        self.state
            .borrow_mut()
            .pending
            .entry(priority)
            .or_default()
            .push_back(task);
        true
    }

    fn take(&self) -> Option<Rc<Task>> {
        let mut state = self.state.borrow_mut();
        let best_reactivated = state.reactivated.keys().next_back().copied();
        let best_pending = state.pending.keys().next_back().copied();
        let PoolState {
            pending,
            reactivated,
            ..
        } = &mut *state;
        match (best_reactivated, best_pending) {
            // Reactivated entries win ties at equal priority
            (Some(r), Some(p)) if r >= p => self.pop(reactivated),
            (Some(_), None) => self.pop(reactivated),
            (_, Some(_)) => self.pop(pending),
            (None, None) => None,
        }
    }

    fn size(&self) -> usize {
        let state = self.state.borrow();
        PoolState::count(&state.pending) + PoolState::count(&state.reactivated)
    }

    fn pause(&self, task: &Rc<Task>) {
        task.set_state(TaskState::Paused);
        self.state.borrow_mut().paused.push(Rc::clone(task));
    }

    fn activate(&self, task: &Rc<Task>) {
        let mut state = self.state.borrow_mut();
        state.paused.retain(|held| !Rc::ptr_eq(held, task));
        task.set_state(TaskState::Reactivated);
        state
            .reactivated
            .entry(task.request().priority())
            .or_default()
            .push_back(Rc::clone(task));
    }
}
