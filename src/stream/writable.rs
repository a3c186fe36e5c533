//! Consumer side: accepts chunks, buffers under backpressure, drains and
//! finishes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use super::{Core, CoreParts, ReadSide, UnitHook, WriteHook, default_destroy};
use crate::callback::Callback;
use crate::config::StreamOptions;
use crate::error::{ProtocolViolation, StreamError};
use crate::event::{Emitter, Event, EventEmitter, EventKind, ListenerId};
use crate::pipe::{LinkableSink, PipeCallback, PipeSource, SignalListener, Sink, SinkSignal};

pub(crate) struct WritableState<T> {
    pub(crate) buffer: VecDeque<T>,
    pub(crate) capacity: usize,
    pub(crate) half_open: bool,
    pub(crate) sync_write: bool,
    pub(crate) corked: bool,
    pub(crate) drained: bool,
    pub(crate) ended: bool,
    pub(crate) finish_emitted: bool,
    /// Also guards the end hook while it runs.
    pub(crate) writing: bool,
    pub(crate) destroyed: bool,
    pub(crate) destroy_reason: Option<StreamError>,
    pub(crate) source: Option<Rc<dyn PipeSource>>,
    /// Completion for a fast-path pipe feeding this writable.
    pub(crate) after_pipe: Option<PipeCallback>,
}

impl<T> WritableState<T> {
    fn new(capacity: usize, half_open: bool) -> Self {
        Self {
            buffer: VecDeque::new(),
            capacity,
            half_open,
            sync_write: false,
            corked: false,
            drained: true,
            ended: false,
            finish_emitted: false,
            writing: false,
            destroyed: false,
            destroy_reason: None,
            source: None,
            after_pipe: None,
        }
    }
}

pub(crate) struct WriteSide<R: 'static, W: 'static> {
    pub(crate) state: RefCell<WritableState<W>>,
    write_hook: WriteHook<R, W>,
    end_hook: UnitHook<R, W>,
}

impl<R: 'static, W: 'static> WriteSide<R, W> {
    pub(crate) fn new(
        write_hook: WriteHook<R, W>,
        end_hook: UnitHook<R, W>,
        capacity: usize,
        half_open: bool,
    ) -> Self {
        Self {
            state: RefCell::new(WritableState::new(capacity, half_open)),
            write_hook,
            end_hook,
        }
    }

    /// A write side that accepts nothing, for pure readables.
    pub(crate) fn inert() -> Self {
        let mut state = WritableState::new(1, true);
        state.ended = true;
        state.finish_emitted = true;
        state.writing = true;
        Self {
            state: RefCell::new(state),
            write_hook: Rc::new(|_: &Rc<Core<R, W>>, _: W, cb: Callback| cb.done()),
            end_hook: default_destroy(),
        }
    }

    pub(crate) fn is_finish_emitted(&self) -> bool {
        self.state.borrow().finish_emitted
    }

    pub(crate) fn destroy_reason(&self) -> Option<StreamError> {
        self.state.borrow().destroy_reason.clone()
    }

    pub(crate) fn take_pipe_callback(&self) -> Option<(PipeCallback, bool)> {
        let mut st = self.state.borrow_mut();
        let finished = st.finish_emitted;
        st.after_pipe.take().map(|done| (done, finished))
    }

    /// Latch destroyed, stop dispatching and sever the source.
    pub(crate) fn halt(&self, reason: Option<StreamError>) -> Option<Rc<dyn PipeSource>> {
        let mut st = self.state.borrow_mut();
        st.destroyed = true;
        if reason.is_some() {
            st.destroy_reason = reason;
        }
        st.writing = true;
        st.source.take()
    }
}

impl<R: 'static, W: 'static> Core<R, W> {
    pub(crate) fn write(self: &Rc<Self>, chunk: W) -> bool {
        let mut st = self.write.state.borrow_mut();
        if st.destroyed || st.ended {
            return false;
        }
        if !st.writing && st.buffer.is_empty() && !st.corked {
            drop(st);
            self.dispatch_write(chunk);
            return true;
        }

        st.buffer.push_back(chunk);
        let len = st.buffer.len();
        if st.drained {
            st.drained = len < st.capacity;
            if !st.drained {
                trace!(stream = %self.label, buffered = len, "write buffer at high water mark");
            }
        }
        st.drained
    }

    /// Feed the write hook, looping while it completes synchronously.
    fn dispatch_write(self: &Rc<Self>, chunk: W) {
        let mut next = Some(chunk);
        while let Some(chunk) = next.take() {
            {
                let mut st = self.write.state.borrow_mut();
                if st.destroyed || st.writing {
                    break;
                }
                st.writing = true;
                st.sync_write = true;
            }

            let this = self.clone();
            (self.write.write_hook)(self, chunk, Callback::new(move |result| this.after_write(result)));

            let mut st = self.write.state.borrow_mut();
            st.sync_write = false;
            if st.writing {
                return;
            }
            if !st.corked {
                next = st.buffer.pop_front();
            }
        }
        self.emit_finish_maybe();
    }

    pub(crate) fn after_write(self: &Rc<Self>, result: Result<(), StreamError>) {
        if self.write.state.borrow().destroyed {
            return;
        }
        if let Err(err) = result {
            return self.fail("write", err);
        }

        let drained = {
            let mut st = self.write.state.borrow_mut();
            st.writing = false;
            if !st.drained && st.buffer.is_empty() {
                st.drained = true;
                Some(st.source.clone())
            } else {
                None
            }
        };
        if let Some(source) = drained {
            if let Some(source) = source {
                source.resume();
            }
            self.events.emit(&Event::Drain);
        }

        let next = {
            let mut st = self.write.state.borrow_mut();
            if st.writing || st.sync_write || st.corked || st.destroyed {
                None
            } else {
                st.buffer.pop_front()
            }
        };
        if let Some(chunk) = next {
            self.dispatch_write(chunk);
        }

        self.emit_finish_maybe();
    }

    pub(crate) fn emit_finish_maybe(self: &Rc<Self>) {
        {
            let mut st = self.write.state.borrow_mut();
            if !st.ended
                || !st.buffer.is_empty()
                || st.finish_emitted
                || st.destroyed
                || st.corked
                || st.writing
            {
                return;
            }
            st.finish_emitted = true;
            st.writing = true;
        }
        let this = self.clone();
        (self.write.end_hook)(self, Callback::new(move |result| this.after_end(result)));
    }

    fn after_end(self: &Rc<Self>, result: Result<(), StreamError>) {
        if self.write.state.borrow().destroyed {
            return;
        }
        if let Err(err) = result {
            return self.fail("end", err);
        }
        let half_open = self.write.state.borrow().half_open;

        debug!(stream = %self.label, "writable finished");
        self.events.emit(&Event::Finish);
        if !half_open {
            self.push_end();
        }
        self.destroy_maybe();
    }

    pub(crate) fn end(self: &Rc<Self>, chunk: Option<W>) {
        if self.write.state.borrow().ended {
            return;
        }
        if let Some(chunk) = chunk {
            self.write(chunk);
        }
        self.write.state.borrow_mut().ended = true;
        self.emit_finish_maybe();
    }

    pub(crate) fn cork(self: &Rc<Self>) {
        {
            let mut st = self.write.state.borrow_mut();
            if st.corked {
                return;
            }
            st.corked = true;
        }
        self.events.emit(&Event::Cork);
    }

    pub(crate) fn uncork(self: &Rc<Self>) {
        {
            let mut st = self.write.state.borrow_mut();
            if !st.corked {
                return;
            }
            st.corked = false;
        }
        self.events.emit(&Event::Uncork);
        if !self.write.state.borrow().writing {
            self.after_write(Ok(()));
        }
    }
}

impl<R: 'static, W: 'static> LinkableSink for Core<R, W> {
    fn link_source(
        &self,
        source: Rc<dyn PipeSource>,
        done: Option<PipeCallback>,
    ) -> Result<(), ProtocolViolation> {
        let mut st = self.write.state.borrow_mut();
        if st.source.is_some() {
            return Err(ProtocolViolation::SinkAlreadySourced);
        }
        st.source = Some(source);
        st.after_pipe = done;
        Ok(())
    }

    fn suppress_unhandled_errors(&self) {
        self.listen(EventKind::Error, false, Rc::new(|_: &Event<'_, R>| {}));
    }
}

/// A consumer of chunks.
///
/// Chunks go to the write hook one at a time, in order. While a write is
/// outstanding further chunks are buffered; `write` returns false once the
/// buffer reaches its capacity and `drain` fires when it has been flushed.
pub struct Writable<T: 'static> {
    pub(crate) core: Rc<Core<Infallible, T>>,
}

impl<T: 'static> Clone for Writable<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for Writable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.core.write.state.borrow();
        f.debug_struct("Writable")
            .field("name", &self.core.label)
            .field("buffered", &st.buffer.len())
            .field("corked", &st.corked)
            .field("ended", &st.ended)
            .field("destroyed", &st.destroyed)
            .finish()
    }
}

impl<T: 'static> Writable<T> {
    pub fn builder() -> WritableBuilder<T> {
        WritableBuilder::new()
    }

    pub(crate) fn from_core(core: Rc<Core<Infallible, T>>) -> Self {
        Self { core }
    }

    /// Write a chunk. Returns false if the chunk was rejected (destroyed or
    /// ended) or if the caller should wait for `drain`.
    pub fn write(&self, chunk: impl Into<T>) -> bool {
        self.core.write(chunk.into())
    }

    /// Signal that no more chunks will be written.
    pub fn end(&self) {
        self.core.end(None)
    }

    /// Write a final chunk, then end.
    pub fn end_with(&self, chunk: impl Into<T>) {
        self.core.end(Some(chunk.into()))
    }

    pub fn cork(&self) {
        self.core.cork()
    }

    pub fn uncork(&self) {
        self.core.uncork()
    }

    pub fn destroy(&self, reason: Option<StreamError>) {
        self.core.destroy(reason)
    }

    pub fn on<F>(&self, kind: EventKind, f: F) -> ListenerId
    where
        F: Fn(&Event<'_, Infallible>) + 'static,
    {
        self.core.listen(kind, false, Rc::new(f))
    }

    pub fn once<F>(&self, kind: EventKind, f: F) -> ListenerId
    where
        F: Fn(&Event<'_, Infallible>) + 'static,
    {
        self.core.listen(kind, true, Rc::new(f))
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.core.unlisten(id)
    }

    pub fn on_error<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&StreamError) + 'static,
    {
        self.core.listen_error(f)
    }

    pub fn is_corked(&self) -> bool {
        self.core.write.state.borrow().corked
    }

    /// True once the finish conditions were met and the end hook started.
    pub fn is_finished(&self) -> bool {
        self.core.write.state.borrow().finish_emitted
    }

    pub fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }

    pub fn buffered_len(&self) -> usize {
        self.core.write.state.borrow().buffer.len()
    }
}

impl<T: 'static> Sink<T> for Writable<T> {
    fn write(&self, chunk: T) -> bool {
        self.core.write(chunk)
    }

    fn end(&self) {
        self.core.end(None)
    }

    fn destroy(&self, reason: Option<StreamError>) {
        self.core.destroy(reason)
    }

    fn subscribe(&self, signal: SinkSignal, listener: SignalListener) -> ListenerId {
        self.core.subscribe_signal(signal, listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.core.unlisten(id);
    }

    fn as_linkable(&self) -> Option<&dyn LinkableSink> {
        Some(&*self.core)
    }
}

type UserWrite<T> = Rc<dyn Fn(&Writable<T>, T, Callback)>;
type UserUnit<T> = Rc<dyn Fn(&Writable<T>, Callback)>;

/// Builder for `Writable`.
pub struct WritableBuilder<T: 'static> {
    options: StreamOptions,
    emitter: Option<Box<dyn Emitter<Infallible>>>,
    write: Option<UserWrite<T>>,
    end: Option<UserUnit<T>>,
    destroy: Option<UserUnit<T>>,
}

impl<T: 'static> Default for WritableBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> WritableBuilder<T> {
    pub fn new() -> Self {
        Self {
            options: StreamOptions::default(),
            emitter: None,
            write: None,
            end: None,
            destroy: None,
        }
    }

    /// Install the write hook. Without one every chunk is accepted and dropped.
    pub fn with_write<F>(mut self, f: F) -> Self
    where
        F: Fn(&Writable<T>, T, Callback) + 'static,
    {
        self.write = Some(Rc::new(f));
        self
    }

    /// Install the end hook, run once before `finish`.
    pub fn with_end<F>(mut self, f: F) -> Self
    where
        F: Fn(&Writable<T>, Callback) + 'static,
    {
        self.end = Some(Rc::new(f));
        self
    }

    pub fn with_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn(&Writable<T>, Callback) + 'static,
    {
        self.destroy = Some(Rc::new(f));
        self
    }

    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.options.high_water_mark = high_water_mark;
        self
    }

    pub fn with_emitter(mut self, emitter: impl Emitter<Infallible> + 'static) -> Self {
        self.emitter = Some(Box::new(emitter));
        self
    }

    pub fn build(self) -> Writable<T> {
        let write: WriteHook<Infallible, T> = match self.write {
            Some(f) => Rc::new(move |core: &Rc<Core<Infallible, T>>, chunk: T, cb: Callback| {
                f(&Writable::from_core(core.clone()), chunk, cb)
            }),
            None => Rc::new(|_: &Rc<Core<Infallible, T>>, _: T, cb: Callback| cb.done()),
        };
        let end = wrap_unit(self.end);
        let destroy = wrap_unit(self.destroy);

        let parts = CoreParts {
            label: self.options.label("writable"),
            events: self
                .emitter
                .unwrap_or_else(|| Box::new(EventEmitter::new())),
            read: ReadSide::inert(),
            write: WriteSide::new(write, end, self.options.capacity(), self.options.half_open),
            destroy,
        };
        Writable::from_core(Core::spawn(parts, None))
    }
}

fn wrap_unit<T: 'static>(hook: Option<UserUnit<T>>) -> UnitHook<Infallible, T> {
    match hook {
        Some(f) => Rc::new(move |core: &Rc<Core<Infallible, T>>, cb: Callback| {
            f(&Writable::from_core(core.clone()), cb)
        }),
        None => default_destroy(),
    }
}
