//! Notification capability used by every stream.
//!
//! Streams do not extend an emitter type. They hold any `Emitter`
//! implementation and use it to register listeners by event kind and to
//! notify them synchronously, in registration order. `EventEmitter` is the
//! default implementation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::StreamError;

/// Names of the notifications a stream can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A chunk was delivered to consumers
    Data,
    /// The read buffer went from empty to non-empty
    Readable,
    /// The producer is exhausted and drained; fires once
    End,
    /// The consumer side ended and drained; fires once
    Finish,
    /// Teardown completed; fires once, always last
    Close,
    /// A failure reason, emitted at most once per destroy and before `Close`
    Error,
    Pause,
    Resume,
    /// The write buffer was flushed after signalling backpressure
    Drain,
    Cork,
    Uncork,
}

impl EventKind {
    /// The conventional lowercase name of this notification.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Data => "data",
            EventKind::Readable => "readable",
            EventKind::End => "end",
            EventKind::Finish => "finish",
            EventKind::Close => "close",
            EventKind::Error => "error",
            EventKind::Pause => "pause",
            EventKind::Resume => "resume",
            EventKind::Drain => "drain",
            EventKind::Cork => "cork",
            EventKind::Uncork => "uncork",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification together with its payload.
#[derive(Debug)]
pub enum Event<'a, T> {
    Data(&'a T),
    Readable,
    End,
    Finish,
    Close,
    Error(&'a StreamError),
    Pause,
    Resume,
    Drain,
    Cork,
    Uncork,
}

impl<T> Event<'_, T> {
    /// The kind of this notification.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Data(_) => EventKind::Data,
            Event::Readable => EventKind::Readable,
            Event::End => EventKind::End,
            Event::Finish => EventKind::Finish,
            Event::Close => EventKind::Close,
            Event::Error(_) => EventKind::Error,
            Event::Pause => EventKind::Pause,
            Event::Resume => EventKind::Resume,
            Event::Drain => EventKind::Drain,
            Event::Cork => EventKind::Cork,
            Event::Uncork => EventKind::Uncork,
        }
    }

    /// The chunk carried by a `Data` notification.
    pub fn data(&self) -> Option<&T> {
        match self {
            Event::Data(chunk) => Some(chunk),
            _ => None,
        }
    }

    /// The failure carried by an `Error` notification.
    pub fn error(&self) -> Option<&StreamError> {
        match self {
            Event::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// A registered listener.
pub type Listener<T> = Rc<dyn Fn(&Event<'_, T>)>;

/// Handle returned by registration, used to remove a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Capability to register listeners by kind and notify them.
///
/// Implementations must call listeners synchronously, in registration order,
/// and must tolerate listeners that register or remove listeners (including
/// themselves) while a notification is being delivered.
pub trait Emitter<T> {
    /// Register a listener. A `once` listener is removed before its first call.
    fn add_listener(&self, kind: EventKind, once: bool, listener: Listener<T>) -> ListenerId;

    /// Remove a listener. Returns false if it was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Deliver a notification. Returns whether any listener was called.
    fn emit(&self, event: &Event<'_, T>) -> bool;

    /// Number of listeners registered for `kind`.
    fn listener_count(&self, kind: EventKind) -> usize;
}

struct Entry<T> {
    id: ListenerId,
    kind: EventKind,
    once: bool,
    listener: Listener<T>,
}

/// Default `Emitter` backed by a registration-ordered list.
pub struct EventEmitter<T> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Entry<T>>>,
}

impl<T> EventEmitter<T> {
    /// Create an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            entries: RefCell::new(Vec::new()),
        }
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.entries.borrow().len())
            .finish()
    }
}

impl<T> Emitter<T> for EventEmitter<T> {
    fn add_listener(&self, kind: EventKind, once: bool, listener: Listener<T>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push(Entry {
            id,
            kind,
            once,
            listener,
        });
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    fn emit(&self, event: &Event<'_, T>) -> bool {
        let kind = event.kind();

        // Snapshot first: listeners are free to touch the registry.
        let snapshot: Vec<Listener<T>> = {
            let mut entries = self.entries.borrow_mut();
            let matched = entries
                .iter()
                .filter(|e| e.kind == kind)
                .map(|e| e.listener.clone())
                .collect();
            entries.retain(|e| !(e.kind == kind && e.once));
            matched
        };

        for listener in &snapshot {
            listener(event);
        }
        !snapshot.is_empty()
    }

    fn listener_count(&self, kind: EventKind) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}
