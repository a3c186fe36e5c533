//! Deferred scheduling capability.
//!
//! A stream defers its first pull to the next scheduler turn so callers can
//! attach listeners before any data flows. The library never runs a loop of
//! its own; it only asks a `Scheduler` to run a task "after the current
//! synchronous work".

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Runs a task after the current synchronous execution completes.
pub trait Scheduler {
    fn defer(&self, task: Task);
}

/// A manually driven run queue.
///
/// Tasks run in the order they were deferred, when the owner calls
/// `run_once` or `run_until_idle`. Tasks may defer further tasks.
#[derive(Clone, Default)]
pub struct TickQueue {
    queue: Rc<RefCell<VecDeque<Task>>>,
}

impl TickQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run the oldest task. Returns false if the queue was empty.
    pub fn run_once(&self) -> bool {
        let task = self.queue.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until the queue is empty, including tasks deferred while
    /// running. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        ran
    }
}

impl Scheduler for TickQueue {
    fn defer(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
    }
}

impl fmt::Debug for TickQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(feature = "async")]
mod tokio_sched;

#[cfg(feature = "async")]
pub use tokio_sched::TokioScheduler;
