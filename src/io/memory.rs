//! In-memory sources and sinks for tests and adapters.

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};

use crate::error::StreamError;
use crate::event::{Emitter, Event, EventEmitter, ListenerId};
use crate::pipe::{SignalListener, Sink, SinkSignal};
use crate::sched::Scheduler;
use crate::stream::Readable;

/// A preset list of chunks that can be opened as a readable any number of
/// times.
#[derive(Debug, Clone)]
pub struct InMemorySource<T> {
    id: String,
    chunks: Rc<Vec<T>>,
}

impl<T: Clone + 'static> InMemorySource<T> {
    pub fn new(id: impl Into<String>, chunks: Vec<T>) -> Self {
        Self {
            id: id.into(),
            chunks: Rc::new(chunks),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// A fresh readable yielding every chunk in order, then ending.
    pub fn open<S>(&self, scheduler: &S) -> Readable<T>
    where
        S: Scheduler + Clone + 'static,
    {
        let chunks = self.chunks.clone();
        let next = Cell::new(0usize);
        Readable::builder(scheduler)
            .with_name(self.id.clone())
            .with_read(move |_, cb| {
                let index = next.get();
                next.set(index + 1);
                cb.chunk_or_end(chunks.get(index).cloned())
            })
            .build()
    }
}

impl InMemorySource<Bytes> {
    /// Split `data` into chunks of at most `chunk_size` bytes.
    pub fn from_bytes(id: impl Into<String>, data: impl Into<Bytes>, chunk_size: usize) -> Self {
        let mut data: Bytes = data.into();
        let chunk_size = chunk_size.max(1);
        let mut chunks = Vec::with_capacity(data.len().div_ceil(chunk_size));
        while !data.is_empty() {
            let at = chunk_size.min(data.len());
            chunks.push(data.split_to(at));
        }
        Self::new(id, chunks)
    }
}

struct SinkInner<T> {
    id: String,
    buf: RefCell<Vec<T>>,
    events: EventEmitter<Infallible>,
    capacity: Option<usize>,
    unacked: Cell<usize>,
    finished: Cell<bool>,
    closed: Cell<bool>,
}

/// Collects every chunk written to it.
///
/// This is a plain `Sink`, not a native stream, so a readable piped into it
/// uses the fallback path. With a capacity, `write` reports backpressure
/// after that many chunks until `drain` is called.
pub struct InMemorySink<T> {
    inner: Rc<SinkInner<T>>,
}

impl<T> Clone for InMemorySink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for InMemorySink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySink")
            .field("id", &self.inner.id)
            .field("len", &self.inner.buf.borrow().len())
            .field("finished", &self.inner.finished.get())
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}

impl<T> InMemorySink<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Self::build(id.into(), None)
    }

    /// A sink that asks its source to pause every `capacity` chunks.
    pub fn with_capacity(id: impl Into<String>, capacity: usize) -> Self {
        Self::build(id.into(), Some(capacity.max(1)))
    }

    fn build(id: String, capacity: Option<usize>) -> Self {
        Self {
            inner: Rc::new(SinkInner {
                id,
                buf: RefCell::new(Vec::new()),
                events: EventEmitter::new(),
                capacity,
                unacked: Cell::new(0),
                finished: Cell::new(false),
                closed: Cell::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn len(&self) -> usize {
        self.inner.buf.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.buf.borrow().is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.get()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Release backpressure and notify the source.
    pub fn drain(&self) {
        self.inner.unacked.set(0);
        self.inner.events.emit(&Event::Drain);
    }

    /// Remove and return everything written so far.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.inner.buf.borrow_mut())
    }
}

impl<T: Clone> InMemorySink<T> {
    pub fn contents(&self) -> Vec<T> {
        self.inner.buf.borrow().clone()
    }
}

impl InMemorySink<Bytes> {
    /// All chunks joined into one buffer.
    pub fn concat(&self) -> Bytes {
        let buf = self.inner.buf.borrow();
        let mut out = BytesMut::with_capacity(buf.iter().map(Bytes::len).sum());
        for chunk in buf.iter() {
            out.extend_from_slice(chunk);
        }
        out.freeze()
    }

    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.concat()).into_owned()
    }
}

impl<T> Sink<T> for InMemorySink<T> {
    fn write(&self, chunk: T) -> bool {
        if self.inner.finished.get() || self.inner.closed.get() {
            return false;
        }
        self.inner.buf.borrow_mut().push(chunk);
        let unacked = self.inner.unacked.get() + 1;
        self.inner.unacked.set(unacked);
        self.inner.capacity.is_none_or(|capacity| unacked < capacity)
    }

    fn end(&self) {
        if self.inner.finished.replace(true) || self.inner.closed.get() {
            return;
        }
        self.inner.events.emit(&Event::Finish);
        if !self.inner.closed.replace(true) {
            self.inner.events.emit(&Event::Close);
        }
    }

    fn destroy(&self, reason: Option<StreamError>) {
        if self.inner.closed.replace(true) {
            return;
        }
        if let Some(err) = &reason {
            self.inner.events.emit(&Event::Error(err));
        }
        self.inner.events.emit(&Event::Close);
    }

    fn subscribe(&self, signal: SinkSignal, listener: SignalListener) -> ListenerId {
        self.inner.events.add_listener(
            signal.kind(),
            false,
            Rc::new(move |ev: &Event<'_, Infallible>| listener(ev.error())),
        )
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.inner.events.remove_listener(id);
    }
}
