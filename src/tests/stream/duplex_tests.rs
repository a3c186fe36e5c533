//! Tests for Duplex composition.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::event::EventKind;
use crate::sched::TickQueue;
use crate::stream::Duplex;
use crate::tests::support::{Log, collector, watch_duplex};

/// A duplex that records writes and only produces what is pushed to it.
fn echo_duplex(ticks: &TickQueue, half_open: bool) -> (Duplex<String, String>, Rc<RefCell<Vec<String>>>) {
    let written = Rc::new(RefCell::new(Vec::new()));
    let sink = written.clone();
    let d = Duplex::builder(ticks)
        .with_half_open(half_open)
        .with_read(|_, _cb| {})
        .with_write(move |_, chunk: String, cb| {
            sink.borrow_mut().push(chunk);
            cb.done()
        })
        .build();
    (d, written)
}

#[test]
fn half_open_duplex_stays_readable_after_finish() {
    let ticks = TickQueue::new();
    let (d, written) = echo_duplex(&ticks, true);
    let log = Log::new();
    watch_duplex(&d, &log, &[EventKind::Finish, EventKind::End, EventKind::Close]);
    ticks.run_until_idle();

    d.write("in");
    d.end();
    assert_eq!(*written.borrow(), vec!["in"]);
    assert_eq!(log.entries(), vec!["finish"]);
    assert!(d.is_finished());
    assert!(!d.is_destroyed());

    d.push("out");
    d.push_end();
    let data = log.clone();
    d.on_data(move |s| data.push(s.clone()));

    assert_eq!(log.entries(), vec!["finish", "out", "end", "close"]);
    assert!(d.is_destroyed());
}

#[test]
fn finishing_a_non_half_open_duplex_ends_the_read_side() {
    let ticks = TickQueue::new();
    let (d, _) = echo_duplex(&ticks, false);
    let log = Log::new();
    watch_duplex(&d, &log, &[EventKind::Finish, EventKind::End, EventKind::Close]);
    d.resume();
    ticks.run_until_idle();

    d.write("x");
    d.end();

    assert!(d.is_ended());
    assert_eq!(log.entries(), vec!["finish", "end", "close"]);
}

#[test]
fn read_end_alone_does_not_destroy() {
    let ticks = TickQueue::new();
    let (d, _) = echo_duplex(&ticks, true);
    d.resume();
    d.push_end();

    d.destroy_maybe();
    assert!(!d.is_destroyed());

    d.end();
    assert!(d.is_destroyed());
}

#[test]
fn teardown_runs_once_for_both_halves() {
    let ticks = TickQueue::new();
    let hook_calls = Rc::new(Cell::new(0));
    let calls = hook_calls.clone();
    let d = Duplex::<u32, u32>::builder(&ticks)
        .with_read(|_, _cb| {})
        .with_destroy(move |_, cb| {
            calls.set(calls.get() + 1);
            cb.done()
        })
        .build();
    let log = Log::new();
    watch_duplex(&d, &log, &[EventKind::Close]);
    let errors = log.clone();
    d.on_error(move |err| errors.push(format!("error:{err}")));

    d.destroy(Some("broken".into()));
    d.destroy(None);
    d.end();

    assert_eq!(hook_calls.get(), 1);
    assert_eq!(log.entries(), vec!["error:broken", "close"]);
    assert!(!d.write(1u32));
}

#[test]
fn duplex_pipes_its_read_side() {
    let ticks = TickQueue::new();
    let (d, _) = echo_duplex(&ticks, true);
    let (out, seen) = collector::<String>();

    d.pipe(&out).unwrap();
    d.push("a");
    d.push("b");
    d.push_end();
    ticks.run_until_idle();

    assert_eq!(*seen.borrow(), vec!["a", "b"]);
    assert!(out.is_finished());
}

#[test]
fn cork_applies_to_the_write_side() {
    let ticks = TickQueue::new();
    let (d, written) = echo_duplex(&ticks, true);

    d.cork();
    d.write("1");
    d.write("2");
    assert!(d.is_corked());
    assert!(written.borrow().is_empty());

    d.uncork();
    assert_eq!(*written.borrow(), vec!["1", "2"]);
}

#[test]
fn buffers_are_reported_per_side() {
    let ticks = TickQueue::new();
    let (d, _) = echo_duplex(&ticks, true);

    d.push("a");
    d.cork();
    d.write("x");
    d.write("y");
    assert_eq!(d.buffered_len(), 1);
    assert_eq!(d.write_buffered_len(), 2);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    d.once_data(move |chunk| sink.borrow_mut().push(chunk.clone()));
    d.push("b");

    assert_eq!(*seen.borrow(), vec!["a"]);
    assert_eq!(d.buffered_len(), 0);
}
