//! Pipes between native streams.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bytes::Bytes;

use crate::callback::{Callback, TransformCallback};
use crate::error::ProtocolViolation;
use crate::event::EventKind;
use crate::sched::TickQueue;
use crate::stream::{Readable, Transform, Writable};
use crate::tests::support::{Log, Parked, b, collector, manual, pipe_outcome, watch_writable};

fn letters(ticks: &TickQueue) -> Readable<Bytes> {
    Readable::from_iter(ticks, [b("a"), b("b"), b("c")])
}

#[test]
fn pipe_delivers_in_order_then_finishes() {
    let ticks = TickQueue::new();
    let rs = letters(&ticks);
    let (ws, seen) = collector::<Bytes>();
    let log = Log::new();
    watch_writable(&ws, &log, &[EventKind::Finish, EventKind::Close]);

    rs.pipe_with(&ws, pipe_outcome(&log)).unwrap();
    ticks.run_until_idle();

    assert_eq!(*seen.borrow(), vec![b("a"), b("b"), b("c")]);
    assert_eq!(log.entries(), vec!["finish", "pipe:ok", "close"]);
    assert!(rs.is_destroyed());
}

#[test]
fn pipe_through_transform_uppercases() {
    let ticks = TickQueue::new();
    let rs = letters(&ticks);
    let upper = Transform::builder(&ticks, |_, chunk: Bytes, cb: TransformCallback<Bytes>| {
        cb.chunk(Bytes::from(chunk.to_ascii_uppercase()))
    })
    .build();
    let (ws, seen) = collector::<Bytes>();
    let log = Log::new();

    rs.pipe(&upper).unwrap().pipe_with(&ws, pipe_outcome(&log)).unwrap();
    ticks.run_until_idle();

    assert_eq!(*seen.borrow(), vec![b("A"), b("B"), b("C")]);
    assert_eq!(log.entries(), vec!["pipe:ok"]);
    assert!(ws.is_finished());
}

#[test]
fn producer_destroying_itself_fails_the_pipe() {
    let ticks = TickQueue::new();
    let rs = Readable::<Bytes>::builder(&ticks)
        .with_read(|rs, _cb| rs.destroy(None))
        .build();
    let (ws, seen) = collector::<Bytes>();
    let log = Log::new();

    rs.pipe_with(&ws, pipe_outcome(&log)).unwrap();
    ticks.run_until_idle();

    assert!(seen.borrow().is_empty());
    assert_eq!(log.entries(), vec!["pipe:err:stream closed prematurely"]);
    assert!(ws.is_destroyed());
}

#[test]
fn consumer_destroying_itself_fails_the_pipe_and_stops_reads() {
    let ticks = TickQueue::new();
    let reads = Rc::new(Cell::new(0u32));
    let counter = reads.clone();
    let rs = Readable::<u32>::builder(&ticks)
        .with_read(move |_, cb| {
            counter.set(counter.get() + 1);
            cb.chunk(counter.get())
        })
        .build();
    let ws = Writable::<u32>::builder()
        .with_write(|ws, _, _cb| ws.destroy(None))
        .build();
    let log = Log::new();

    rs.pipe_with(&ws, pipe_outcome(&log)).unwrap();
    ticks.run_until_idle();

    assert_eq!(reads.get(), 1);
    assert_eq!(log.entries(), vec!["pipe:err:stream closed prematurely"]);
    assert!(rs.is_destroyed());
}

#[test]
fn destroy_reason_reaches_the_callback() {
    let ticks = TickQueue::new();
    let rs = manual::<u32>(&ticks);
    let (ws, _) = collector::<u32>();
    let log = Log::new();

    rs.pipe_with(&ws, pipe_outcome(&log)).unwrap();
    ws.destroy(Some("socket reset".into()));

    assert_eq!(log.entries(), vec!["pipe:err:socket reset"]);
    assert!(rs.is_destroyed());
}

#[test]
fn second_pipe_is_rejected() {
    let ticks = TickQueue::new();
    let rs = manual::<u32>(&ticks);
    let (first, _) = collector::<u32>();
    let (second, _) = collector::<u32>();

    assert!(rs.pipe(&first).is_ok());
    assert_eq!(rs.pipe(&second).unwrap_err(), ProtocolViolation::AlreadyPiped);
}

#[test]
fn second_source_is_rejected() {
    let ticks = TickQueue::new();
    let one = manual::<u32>(&ticks);
    let two = manual::<u32>(&ticks);
    let (ws, _) = collector::<u32>();

    one.pipe(&ws).unwrap();
    assert_eq!(
        two.pipe(&ws).unwrap_err(),
        ProtocolViolation::SinkAlreadySourced
    );
    // The rejected readable can still be piped elsewhere.
    let (other, _) = collector::<u32>();
    assert!(two.pipe(&other).is_ok());
}

#[test]
fn backpressure_pauses_the_source_until_drain() {
    let ticks = TickQueue::new();
    let next = Cell::new(0u32);
    let rs = Readable::<u32>::builder(&ticks)
        .with_high_water_mark(2)
        .with_read(move |_, cb| {
            let n = next.get();
            next.set(n + 1);
            cb.chunk_or_end((n < 10).then_some(n))
        })
        .build();

    let parked: Parked<Callback> = Parked::new();
    let hook = parked.clone();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let ws = Writable::<u32>::builder()
        .with_high_water_mark(2)
        .with_write(move |_, n, cb| {
            sink.borrow_mut().push(n);
            hook.park(cb);
        })
        .build();
    let log = Log::new();
    watch_writable(&ws, &log, &[EventKind::Drain]);

    rs.pipe_with(&ws, pipe_outcome(&log)).unwrap();
    ticks.run_until_idle();

    assert!(rs.is_paused());
    assert_eq!(*seen.borrow(), vec![0]);
    assert_eq!(rs.buffered_len(), 2);

    parked.release_all();
    assert_eq!(*seen.borrow(), (0..10).collect::<Vec<u32>>());
    assert!(log.count("drain") >= 1);
    assert_eq!(log.count("pipe:ok"), 1);
}

#[test]
fn chained_pipes_return_the_destination() {
    let ticks = TickQueue::new();
    let rs = Readable::from_iter(&ticks, 1..=3u32);
    let pass = Transform::<u32, u32>::passthrough(&ticks);
    let (ws, seen) = collector::<u32>();

    let tail = rs.pipe(&pass).unwrap().pipe(&ws).unwrap();
    ticks.run_until_idle();

    assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    assert!(tail.is_finished());
}

#[test]
fn piping_a_destroyed_source_fails_the_pipe() {
    let ticks = TickQueue::new();
    let rs = manual::<u32>(&ticks);
    let (ws, seen) = collector::<u32>();
    let log = Log::new();
    watch_writable(&ws, &log, &[EventKind::Finish, EventKind::Close]);

    rs.destroy(None);
    rs.pipe_with(&ws, pipe_outcome(&log)).unwrap();
    ticks.run_until_idle();

    assert_eq!(log.entries(), vec!["pipe:err:stream closed prematurely", "close"]);
    assert!(ws.is_destroyed());
    assert!(seen.borrow().is_empty());
    assert_eq!(rs.pipe(&ws).unwrap_err(), ProtocolViolation::AlreadyPiped);
}
