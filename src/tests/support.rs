//! Shared helpers for the internal tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing_subscriber::EnvFilter;

use crate::callback::{Callback, ReadCallback, TransformCallback};
use crate::event::EventKind;
use crate::sched::TickQueue;
use crate::stream::{Duplex, Readable, Writable};

pub(crate) fn b(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

/// Ordered record of what happened during a test.
#[derive(Clone, Default)]
pub(crate) struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub(crate) fn count(&self, entry: &str) -> usize {
        self.0.borrow().iter().filter(|e| *e == entry).count()
    }
}

/// Completion handles held back by a hook so a test can release them later.
pub(crate) struct Parked<C>(Rc<RefCell<VecDeque<C>>>);

impl<C> Clone for Parked<C> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<C> Parked<C> {
    pub(crate) fn new() -> Self {
        Self(Rc::new(RefCell::new(VecDeque::new())))
    }

    pub(crate) fn park(&self, cb: C) {
        self.0.borrow_mut().push_back(cb);
    }

    pub(crate) fn pop(&self) -> Option<C> {
        self.0.borrow_mut().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.borrow().len()
    }
}

impl Parked<Callback> {
    /// Complete the oldest parked write. Returns false if none was parked.
    pub(crate) fn release(&self) -> bool {
        match self.pop() {
            Some(cb) => {
                cb.done();
                true
            }
            None => false,
        }
    }

    pub(crate) fn release_all(&self) -> usize {
        let mut released = 0;
        while self.release() {
            released += 1;
        }
        released
    }
}

impl<T> Parked<ReadCallback<T>> {
    pub(crate) fn release_with(&self, chunk: T) -> bool {
        match self.pop() {
            Some(cb) => {
                cb.chunk(chunk);
                true
            }
            None => false,
        }
    }
}

impl<O> Parked<TransformCallback<O>> {
    pub(crate) fn release_with(&self, chunk: O) -> bool {
        match self.pop() {
            Some(cb) => {
                cb.complete(Ok(Some(chunk)));
                true
            }
            None => false,
        }
    }
}

/// A readable fed only through `push`. Its read hook never completes, so it
/// never pulls on its own.
pub(crate) fn manual<T: 'static>(ticks: &TickQueue) -> Readable<T> {
    Readable::builder(ticks).with_read(|_, _cb| {}).build()
}

/// A writable that records every chunk and completes synchronously.
pub(crate) fn collector<T: Clone + 'static>() -> (Writable<T>, Rc<RefCell<Vec<T>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let ws = Writable::builder()
        .with_write(move |_, chunk: T, cb| {
            sink.borrow_mut().push(chunk);
            cb.done()
        })
        .build();
    (ws, seen)
}

pub(crate) fn watch_readable<T: 'static>(rs: &Readable<T>, log: &Log, kinds: &[EventKind]) {
    for &kind in kinds {
        let log = log.clone();
        rs.on(kind, move |_| log.push(kind.as_str()));
    }
}

pub(crate) fn watch_writable<T: 'static>(ws: &Writable<T>, log: &Log, kinds: &[EventKind]) {
    for &kind in kinds {
        let log = log.clone();
        ws.on(kind, move |_| log.push(kind.as_str()));
    }
}

pub(crate) fn watch_duplex<R: 'static, W: 'static>(
    d: &Duplex<R, W>,
    log: &Log,
    kinds: &[EventKind],
) {
    for &kind in kinds {
        let log = log.clone();
        d.on(kind, move |_| log.push(kind.as_str()));
    }
}

/// Record pipe completions as `ok` or `err:<message>`.
pub(crate) fn pipe_outcome(log: &Log) -> impl FnOnce(Result<(), crate::StreamError>) + 'static {
    let log = log.clone();
    move |outcome| match outcome {
        Ok(()) => log.push("pipe:ok"),
        Err(err) => log.push(format!("pipe:err:{err}")),
    }
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber and return what it logged.
pub(crate) fn capture_logs(f: impl FnOnce()) -> String {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("flowio=trace"))
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}
