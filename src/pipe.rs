//! Linking a readable to a consumer.
//!
//! Any type implementing [`Sink`] can be a pipe destination. Sinks that are
//! native streams also expose [`LinkableSink`], which lets the pipe take the
//! fast path: a direct source link on the destination so that `drain`
//! resumes the source and teardown cascades both ways without going through
//! notifications. Every other sink gets the fallback path, which watches the
//! sink's `finish`, `close`, `error` and `drain` signals.

use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::error::{ProtocolViolation, StreamError};
use crate::event::{Event, EventKind, ListenerId};
use crate::stream::Core;

/// Fired once when a pipe completes: `Ok` on a clean finish, otherwise the
/// failure or `StreamError::PrematureClose`.
pub type PipeCallback = Box<dyn FnOnce(Result<(), StreamError>)>;

/// Listener for a sink signal. Receives the error for `SinkSignal::Error`.
pub type SignalListener = Rc<dyn Fn(Option<&StreamError>)>;

/// Notifications a pipe needs to observe on its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkSignal {
    Finish,
    Close,
    Error,
    Drain,
}

impl SinkSignal {
    pub fn kind(self) -> EventKind {
        match self {
            SinkSignal::Finish => EventKind::Finish,
            SinkSignal::Close => EventKind::Close,
            SinkSignal::Error => EventKind::Error,
            SinkSignal::Drain => EventKind::Drain,
        }
    }
}

/// The consumer protocol a readable pipes into.
pub trait Sink<T> {
    /// Accept a chunk. False means the source should pause until `Drain`.
    fn write(&self, chunk: T) -> bool;

    /// No more chunks will follow.
    fn end(&self);

    fn destroy(&self, reason: Option<StreamError>);

    fn subscribe(&self, signal: SinkSignal, listener: SignalListener) -> ListenerId;

    fn unsubscribe(&self, id: ListenerId);

    /// Native streams return themselves here to enable the fast pipe path.
    fn as_linkable(&self) -> Option<&dyn LinkableSink> {
        None
    }
}

/// Fast-path capability of a native write side.
pub trait LinkableSink {
    /// Record `source` as the only producer feeding this sink. `done` is
    /// resolved when the sink is torn down.
    fn link_source(
        &self,
        source: Rc<dyn PipeSource>,
        done: Option<PipeCallback>,
    ) -> Result<(), ProtocolViolation>;

    /// Failures on a fast-linked pair surface through teardown and the
    /// completion callback only.
    fn suppress_unhandled_errors(&self);
}

/// What a linked sink may do to its source.
pub trait PipeSource {
    fn resume(&self);
    fn destroy(&self, reason: Option<StreamError>);
}

struct SourceLink<R: 'static, W: 'static>(Rc<Core<R, W>>);

impl<R: 'static, W: 'static> PipeSource for SourceLink<R, W> {
    fn resume(&self) {
        self.0.resume()
    }

    fn destroy(&self, reason: Option<StreamError>) {
        self.0.destroy(reason)
    }
}

/// Bookkeeping for a fallback-path pipe, held by the source.
pub(crate) struct FallbackLink<T> {
    sink: Rc<dyn Sink<T>>,
    subscriptions: Vec<ListenerId>,
    done: Option<PipeCallback>,
}

impl<T> fmt::Debug for FallbackLink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackLink")
            .field("subscriptions", &self.subscriptions.len())
            .field("has_callback", &self.done.is_some())
            .finish()
    }
}

impl<R: 'static, W: 'static> Core<R, W> {
    pub(crate) fn pipe(
        self: &Rc<Self>,
        destination: Rc<dyn Sink<R>>,
        done: Option<PipeCallback>,
    ) -> Result<(), ProtocolViolation> {
        if self.read.state.borrow().piped {
            return Err(ProtocolViolation::AlreadyPiped);
        }
        if self.is_destroyed() {
            return self.pipe_destroyed(destination, done);
        }

        match destination.as_linkable() {
            Some(sink) => {
                sink.link_source(Rc::new(SourceLink(self.clone())), done)?;
                sink.suppress_unhandled_errors();
                self.listen(EventKind::Error, false, Rc::new(|_: &Event<'_, R>| {}));
                debug!(stream = %self.label, path = "fast", "pipe established");
            }
            None => {
                let subscriptions = self.watch_sink(destination.as_ref());
                self.read.state.borrow_mut().fallback = Some(FallbackLink {
                    sink: destination.clone(),
                    subscriptions,
                    done,
                });
                debug!(stream = %self.label, path = "fallback", "pipe established");
            }
        }

        {
            let mut st = self.read.state.borrow_mut();
            st.piped = true;
            st.destination = Some(destination);
        }
        self.resume();
        Ok(())
    }

    /// A torn-down source can never feed `destination`: tear it down too and
    /// settle the callback right away.
    fn pipe_destroyed(
        self: &Rc<Self>,
        destination: Rc<dyn Sink<R>>,
        done: Option<PipeCallback>,
    ) -> Result<(), ProtocolViolation> {
        let outcome = match destination.as_linkable() {
            Some(sink) => {
                // The sink settles the callback when it is torn down.
                sink.link_source(Rc::new(SourceLink(self.clone())), done)?;
                sink.suppress_unhandled_errors();
                None
            }
            None => done,
        };
        self.read.state.borrow_mut().piped = true;
        debug!(stream = %self.label, "pipe from a destroyed stream");

        destination.destroy(None);
        if let Some(done) = outcome {
            let reason = self
                .read
                .destroy_reason()
                .unwrap_or(StreamError::PrematureClose);
            done(Err(reason));
        }
        Ok(())
    }

    fn watch_sink(self: &Rc<Self>, sink: &dyn Sink<R>) -> Vec<ListenerId> {
        let on_close = |weak: Weak<Self>| -> SignalListener {
            Rc::new(move |_: Option<&StreamError>| {
                if let Some(core) = weak.upgrade() {
                    core.fallback_closed()
                }
            })
        };

        let on_error: SignalListener = {
            let weak = Rc::downgrade(self);
            Rc::new(move |err: Option<&StreamError>| {
                if let Some(core) = weak.upgrade() {
                    let err = err.cloned().unwrap_or(StreamError::PrematureClose);
                    core.fallback_done(Err(err))
                }
            })
        };

        let on_drain: SignalListener = {
            let weak = Rc::downgrade(self);
            Rc::new(move |_: Option<&StreamError>| {
                if let Some(core) = weak.upgrade() {
                    core.resume()
                }
            })
        };

        vec![
            sink.subscribe(SinkSignal::Finish, on_close(Rc::downgrade(self))),
            sink.subscribe(SinkSignal::Close, on_close(Rc::downgrade(self))),
            sink.subscribe(SinkSignal::Error, on_error),
            sink.subscribe(SinkSignal::Drain, on_drain),
        ]
    }

    fn fallback_closed(self: &Rc<Self>) {
        let outcome = {
            let st = self.read.state.borrow();
            if st.ended {
                Ok(())
            } else {
                Err(st
                    .destroy_reason
                    .clone()
                    .unwrap_or(StreamError::PrematureClose))
            }
        };
        self.fallback_done(outcome)
    }

    fn fallback_done(self: &Rc<Self>, outcome: Result<(), StreamError>) {
        let (link, ended) = {
            let mut st = self.read.state.borrow_mut();
            let Some(link) = st.fallback.take() else {
                return;
            };
            st.destination = None;
            (link, st.ended)
        };

        for id in link.subscriptions {
            link.sink.unsubscribe(id);
        }
        if !ended {
            self.destroy(None);
        }
        if let Some(done) = link.done {
            done(outcome);
        }
    }
}
