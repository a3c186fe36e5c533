//! Tests for TickQueue.

use crate::sched::{Scheduler, TickQueue};
use crate::tests::support::Log;

#[test]
fn tasks_run_in_defer_order() {
    let ticks = TickQueue::new();
    let log = Log::new();
    for tag in ["a", "b", "c"] {
        let log = log.clone();
        ticks.defer(Box::new(move || log.push(tag)));
    }

    assert_eq!(ticks.pending(), 3);
    assert!(log.entries().is_empty());
    assert_eq!(ticks.run_until_idle(), 3);
    assert_eq!(log.entries(), vec!["a", "b", "c"]);
}

#[test]
fn nested_defers_run_after_current_task() {
    let ticks = TickQueue::new();
    let log = Log::new();

    let outer_log = log.clone();
    let inner_ticks = ticks.clone();
    ticks.defer(Box::new(move || {
        let inner_log = outer_log.clone();
        inner_ticks.defer(Box::new(move || inner_log.push("inner")));
        outer_log.push("outer");
    }));
    let tail = log.clone();
    ticks.defer(Box::new(move || tail.push("tail")));

    assert_eq!(ticks.run_until_idle(), 3);
    assert_eq!(log.entries(), vec!["outer", "tail", "inner"]);
}

#[test]
fn run_once_on_empty_queue() {
    let ticks = TickQueue::new();
    assert!(!ticks.run_once());
    assert_eq!(ticks.run_until_idle(), 0);
}
