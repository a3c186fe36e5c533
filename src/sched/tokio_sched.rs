//! Scheduler backed by a tokio `LocalSet`.

use super::{Scheduler, Task};

/// Defers tasks onto the current tokio `LocalSet`.
///
/// Streams are single-threaded, so tasks are spawned with
/// `tokio::task::spawn_local`. Streams built with this scheduler must be
/// created from inside `LocalSet::run_until` (or a task spawned on it).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    pub fn new() -> Self {
        TokioScheduler
    }
}

impl Scheduler for TokioScheduler {
    fn defer(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }
}
