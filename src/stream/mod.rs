//! Stream state machines and their public handles.
//!
//! Every stream is one reference-counted `Core` holding a read side and a
//! write side. A pure readable carries an inert write side and a pure
//! writable an inert read side, so lifecycle checks such as `destroy_maybe`
//! never need to know which kind of stream they run on.
//!
//! Borrowing discipline: state lives in `RefCell`s and no borrow is held
//! across a user hook, a listener, or a call into a linked stream. Hooks may
//! complete synchronously, push, pause or destroy from anywhere.

mod duplex;
mod readable;
mod transform;
mod writable;

pub use duplex::{Duplex, DuplexBuilder};
pub use readable::{Readable, ReadableBuilder};
pub use transform::{Transform, TransformBuilder};
pub use writable::{Writable, WritableBuilder};

pub(crate) use readable::ReadSide;
pub(crate) use writable::WriteSide;

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::callback::{Callback, ReadCallback, ReadOutcome};
use crate::error::StreamError;
use crate::event::{Emitter, Event, EventKind, Listener, ListenerId};
use crate::pipe::{SignalListener, SinkSignal};
use crate::sched::Scheduler;

pub(crate) type ReadHook<R, W> = Rc<dyn Fn(&Rc<Core<R, W>>, ReadCallback<R>)>;
pub(crate) type WriteHook<R, W> = Rc<dyn Fn(&Rc<Core<R, W>>, W, Callback)>;
pub(crate) type UnitHook<R, W> = Rc<dyn Fn(&Rc<Core<R, W>>, Callback)>;

pub(crate) fn default_destroy<R: 'static, W: 'static>() -> UnitHook<R, W> {
    Rc::new(|_: &Rc<Core<R, W>>, cb: Callback| cb.done())
}

pub(crate) struct CoreParts<R: 'static, W: 'static> {
    pub label: String,
    pub events: Box<dyn Emitter<R>>,
    pub read: ReadSide<R, W>,
    pub write: WriteSide<R, W>,
    pub destroy: UnitHook<R, W>,
}

/// Shared state machine behind every stream handle.
pub(crate) struct Core<R: 'static, W: 'static> {
    pub(crate) label: String,
    pub(crate) events: Box<dyn Emitter<R>>,
    pub(crate) read: ReadSide<R, W>,
    pub(crate) write: WriteSide<R, W>,
    destroy_hook: UnitHook<R, W>,
    torn_down: Cell<bool>,
}

impl<R: 'static, W: 'static> Core<R, W> {
    /// Build a core. An active read side gets its first pull deferred to the
    /// next scheduler turn.
    pub(crate) fn spawn(parts: CoreParts<R, W>, scheduler: Option<&dyn Scheduler>) -> Rc<Self> {
        let core = Rc::new(Core {
            label: parts.label,
            events: parts.events,
            read: parts.read,
            write: parts.write,
            destroy_hook: parts.destroy,
            torn_down: Cell::new(false),
        });

        if core.read.is_active() {
            if let Some(scheduler) = scheduler {
                let first = core.clone();
                scheduler.defer(Box::new(move || first.after_read(Ok(ReadOutcome::Pending))));
            }
        }
        core
    }

    pub(crate) fn listen(&self, kind: EventKind, once: bool, listener: Listener<R>) -> ListenerId {
        self.events.add_listener(kind, once, listener)
    }

    pub(crate) fn listen_error<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&StreamError) + 'static,
    {
        self.listen(
            EventKind::Error,
            false,
            Rc::new(move |ev: &Event<'_, R>| {
                if let Some(err) = ev.error() {
                    f(err)
                }
            }),
        )
    }

    pub(crate) fn subscribe_signal(&self, signal: SinkSignal, listener: SignalListener) -> ListenerId {
        self.listen(
            signal.kind(),
            false,
            Rc::new(move |ev: &Event<'_, R>| listener(ev.error())),
        )
    }

    pub(crate) fn unlisten(&self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.torn_down.get()
    }

    pub(crate) fn emit_error(&self, err: &StreamError) {
        if self.events.listener_count(EventKind::Error) == 0 {
            warn!(stream = %self.label, error = %err, "unhandled stream error");
            return;
        }
        self.events.emit(&Event::Error(err));
    }

    /// Route a hook failure into the teardown path.
    pub(crate) fn fail(self: &Rc<Self>, hook: &'static str, err: StreamError) {
        warn!(stream = %self.label, hook, error = %err, "stream hook failed");
        self.destroy(Some(err));
    }

    /// Tear the stream down. Idempotent: the teardown hook, `error` and
    /// `close` happen once no matter how often this is called.
    pub(crate) fn destroy(self: &Rc<Self>, reason: Option<StreamError>) {
        if self.torn_down.replace(true) {
            return;
        }
        debug!(stream = %self.label, reason = ?reason, "destroying stream");

        let destination = self.read.halt(reason.clone());
        let source = self.write.halt(reason);

        // Links are severed above, so the partner cannot cascade back here.
        if let Some(source) = source {
            source.destroy(None);
        }
        if let Some(destination) = destination {
            destination.destroy(None);
        }

        let this = self.clone();
        (self.destroy_hook)(self, Callback::new(move |result| this.after_destroy(result.err())));
    }

    fn after_destroy(self: &Rc<Self>, err: Option<StreamError>) {
        let err = err
            .or_else(|| self.read.destroy_reason())
            .or_else(|| self.write.destroy_reason());

        if let Some((done, finished)) = self.write.take_pipe_callback() {
            let outcome = match &err {
                Some(err) => Err(err.clone()),
                None if finished => Ok(()),
                None => Err(StreamError::PrematureClose),
            };
            done(outcome);
        }

        if let Some(err) = &err {
            self.emit_error(err);
        }
        self.events.emit(&Event::Close);
    }

    /// Destroy once every live half is done: the write side has emitted
    /// `finish` and the read side has emitted `end`.
    pub(crate) fn destroy_maybe(self: &Rc<Self>) {
        if !self.write.is_finish_emitted() || !self.read.is_end_emitted() {
            return;
        }
        self.destroy(None);
    }
}
