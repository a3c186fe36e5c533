//! Producer side: pulls from a read hook, buffers, emits, pauses and resumes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use super::{Core, CoreParts, ReadHook, UnitHook, WriteSide, default_destroy};
use crate::callback::{Callback, ReadCallback, ReadOutcome};
use crate::config::StreamOptions;
use crate::error::{ProtocolViolation, StreamError};
use crate::event::{Emitter, Event, EventEmitter, EventKind, ListenerId};
use crate::pipe::{FallbackLink, Sink};
use crate::sched::Scheduler;

pub(crate) struct ReadableState<T> {
    pub(crate) buffer: VecDeque<T>,
    pub(crate) capacity: usize,
    pub(crate) sync_read: bool,
    pub(crate) reading: bool,
    pub(crate) paused: bool,
    pub(crate) ended: bool,
    pub(crate) end_emitted: bool,
    pub(crate) destroyed: bool,
    pub(crate) destroy_reason: Option<StreamError>,
    pub(crate) destination: Option<Rc<dyn Sink<T>>>,
    /// Latched by the first `pipe`, even after the destination is released.
    pub(crate) piped: bool,
    pub(crate) fallback: Option<FallbackLink<T>>,
}

impl<T> ReadableState<T> {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::new(),
            capacity,
            sync_read: false,
            // Nothing is pulled until the first scheduler turn.
            reading: true,
            paused: true,
            ended: false,
            end_emitted: false,
            destroyed: false,
            destroy_reason: None,
            destination: None,
            piped: false,
            fallback: None,
        }
    }
}

pub(crate) struct ReadSide<R: 'static, W: 'static> {
    pub(crate) state: RefCell<ReadableState<R>>,
    hook: ReadHook<R, W>,
    active: bool,
}

impl<R: 'static, W: 'static> ReadSide<R, W> {
    pub(crate) fn new(hook: ReadHook<R, W>, capacity: usize) -> Self {
        Self {
            state: RefCell::new(ReadableState::new(capacity)),
            hook,
            active: true,
        }
    }

    /// A read side that never produces, for pure writables.
    pub(crate) fn inert() -> Self {
        let mut state = ReadableState::new(1);
        state.ended = true;
        state.end_emitted = true;
        Self {
            state: RefCell::new(state),
            hook: Rc::new(|_: &Rc<Core<R, W>>, cb: ReadCallback<R>| cb.end()),
            active: false,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn is_end_emitted(&self) -> bool {
        self.state.borrow().end_emitted
    }

    pub(crate) fn destroy_reason(&self) -> Option<StreamError> {
        self.state.borrow().destroy_reason.clone()
    }

    /// Latch destroyed, stop the pump and sever the destination.
    pub(crate) fn halt(&self, reason: Option<StreamError>) -> Option<Rc<dyn Sink<R>>> {
        let mut st = self.state.borrow_mut();
        st.destroyed = true;
        if reason.is_some() {
            st.destroy_reason = reason;
        }
        st.reading = true;
        st.paused = true;
        st.end_emitted = true;
        st.destination.take()
    }
}

impl<R: 'static, W: 'static> Core<R, W> {
    pub(crate) fn after_read(self: &Rc<Self>, result: Result<ReadOutcome<R>, StreamError>) {
        if self.read.state.borrow().destroyed {
            return;
        }
        match result {
            Err(err) => return self.fail("read", err),
            Ok(ReadOutcome::Chunk(chunk)) => {
                self.push(chunk);
            }
            Ok(ReadOutcome::End) => {
                self.push_end();
            }
            Ok(ReadOutcome::Pending) => {}
        }

        let pump = {
            let mut st = self.read.state.borrow_mut();
            if st.destroyed {
                return;
            }
            st.reading = false;
            !st.sync_read
        };
        // A synchronous completion is picked up by the loop in `pump_read`.
        if pump {
            self.pump_read();
        }
    }

    pub(crate) fn pump_read(self: &Rc<Self>) {
        loop {
            {
                let mut st = self.read.state.borrow_mut();
                if st.destroyed || st.ended || st.reading || st.buffer.len() >= st.capacity {
                    break;
                }
                st.reading = true;
                st.sync_read = true;
            }
            let this = self.clone();
            (self.read.hook)(self, ReadCallback::new(move |result| this.after_read(result)));
            self.read.state.borrow_mut().sync_read = false;
        }
    }

    pub(crate) fn push(self: &Rc<Self>, chunk: R) -> bool {
        let (len, capacity) = {
            let mut st = self.read.state.borrow_mut();
            if st.destroyed {
                return false;
            }
            if !st.paused && st.buffer.is_empty() {
                drop(st);
                self.deliver(chunk);
                return true;
            }
            st.buffer.push_back(chunk);
            (st.buffer.len(), st.capacity)
        };

        if len == 1 {
            self.events.emit(&Event::Readable);
        }
        if len >= capacity {
            trace!(stream = %self.label, buffered = len, "read buffer at high water mark");
            return false;
        }
        true
    }

    pub(crate) fn push_end(self: &Rc<Self>) -> bool {
        {
            let mut st = self.read.state.borrow_mut();
            if st.destroyed {
                return false;
            }
            st.ended = true;
        }
        self.emit_end_maybe();
        false
    }

    /// Hand one chunk to `data` listeners, then to the destination.
    fn deliver(self: &Rc<Self>, chunk: R) {
        self.events.emit(&Event::Data(&chunk));
        let destination = self.read.state.borrow().destination.clone();
        if let Some(destination) = destination {
            if !destination.write(chunk) {
                self.pause();
            }
        }
    }

    pub(crate) fn emit_end_maybe(self: &Rc<Self>) {
        {
            let mut st = self.read.state.borrow_mut();
            if st.paused || !st.ended || !st.buffer.is_empty() || st.end_emitted {
                return;
            }
            st.end_emitted = true;
            st.paused = true;
        }
        debug!(stream = %self.label, "readable ended");
        self.events.emit(&Event::End);

        let destination = self.read.state.borrow_mut().destination.take();
        if let Some(destination) = destination {
            destination.end();
        }
        self.destroy_maybe();
    }

    pub(crate) fn pause(self: &Rc<Self>) {
        {
            let mut st = self.read.state.borrow_mut();
            if st.destroyed || st.paused {
                return;
            }
            st.paused = true;
        }
        self.events.emit(&Event::Pause);
    }

    pub(crate) fn resume(self: &Rc<Self>) {
        {
            let mut st = self.read.state.borrow_mut();
            if st.destroyed || !st.paused {
                return;
            }
            st.paused = false;
        }
        self.events.emit(&Event::Resume);

        // A listener may pause again mid-flush.
        loop {
            let next = {
                let mut st = self.read.state.borrow_mut();
                if st.paused {
                    None
                } else {
                    st.buffer.pop_front()
                }
            };
            match next {
                Some(chunk) => self.deliver(chunk),
                None => break,
            }
        }

        self.emit_end_maybe();
        self.pump_read();
    }

    pub(crate) fn read(self: &Rc<Self>) -> Option<R> {
        let chunk = {
            let mut st = self.read.state.borrow_mut();
            if st.destroyed {
                return None;
            }
            st.buffer.pop_front()
        };
        if let Some(chunk) = &chunk {
            self.events.emit(&Event::Data(chunk));
        }
        self.pump_read();
        chunk
    }

    pub(crate) fn listen_data<F>(self: &Rc<Self>, once: bool, f: F) -> ListenerId
    where
        F: Fn(&R) + 'static,
    {
        let id = self.listen(
            EventKind::Data,
            once,
            Rc::new(move |ev: &Event<'_, R>| {
                if let Some(chunk) = ev.data() {
                    f(chunk)
                }
            }),
        );
        self.resume();
        id
    }
}

/// A producer of chunks.
///
/// Data comes from the read hook installed with `ReadableBuilder::with_read`,
/// or from `push` calls made by the owner. The stream starts paused; it
/// flows once it is resumed, piped, or gets a `data` listener.
///
/// ```rust,ignore
/// use flowio::{Readable, TickQueue};
///
/// let ticks = TickQueue::new();
/// let rs = Readable::<bytes::Bytes>::from_iter(&ticks, ["a", "b", "c"].map(bytes::Bytes::from));
/// rs.on_data(|chunk| println!("{chunk:?}"));
/// ticks.run_until_idle();
/// ```
pub struct Readable<T: 'static> {
    pub(crate) core: Rc<Core<T, Infallible>>,
}

impl<T: 'static> Clone for Readable<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for Readable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.core.read.state.borrow();
        f.debug_struct("Readable")
            .field("name", &self.core.label)
            .field("buffered", &st.buffer.len())
            .field("paused", &st.paused)
            .field("ended", &st.ended)
            .field("destroyed", &st.destroyed)
            .finish()
    }
}

impl<T: 'static> Readable<T> {
    /// Start building a readable driven by `scheduler`.
    pub fn builder<S>(scheduler: &S) -> ReadableBuilder<T>
    where
        S: Scheduler + Clone + 'static,
    {
        ReadableBuilder::new(scheduler)
    }

    /// A readable that yields the items of `iter`, then ends.
    pub fn from_iter<S, I>(scheduler: &S, iter: I) -> Self
    where
        S: Scheduler + Clone + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        let items = RefCell::new(iter.into_iter());
        ReadableBuilder::new(scheduler)
            .with_read(move |_, cb| {
                let next = items.borrow_mut().next();
                cb.chunk_or_end(next)
            })
            .build()
    }

    pub(crate) fn from_core(core: Rc<Core<T, Infallible>>) -> Self {
        Self { core }
    }

    /// Add a chunk. Returns false once the buffer reaches its capacity, or
    /// if the stream is destroyed.
    pub fn push(&self, chunk: impl Into<T>) -> bool {
        self.core.push(chunk.into())
    }

    /// Signal that no more data will be pushed.
    pub fn push_end(&self) -> bool {
        self.core.push_end()
    }

    /// Take one buffered chunk, emitting it as `data`.
    pub fn read(&self) -> Option<T> {
        self.core.read()
    }

    pub fn pause(&self) {
        self.core.pause()
    }

    pub fn resume(&self) {
        self.core.resume()
    }

    /// Link this readable to `destination` and start the flow.
    ///
    /// Returns the destination so pipes can be chained.
    pub fn pipe<S>(&self, destination: &S) -> Result<S, ProtocolViolation>
    where
        S: Sink<T> + Clone + 'static,
    {
        self.core.pipe(Rc::new(destination.clone()), None)?;
        Ok(destination.clone())
    }

    /// Like `pipe`, with a callback fired exactly once when the pipe
    /// completes or fails.
    pub fn pipe_with<S, F>(&self, destination: &S, done: F) -> Result<S, ProtocolViolation>
    where
        S: Sink<T> + Clone + 'static,
        F: FnOnce(Result<(), StreamError>) + 'static,
    {
        self.core.pipe(Rc::new(destination.clone()), Some(Box::new(done)))?;
        Ok(destination.clone())
    }

    /// Tear the stream down, optionally with a failure reason.
    pub fn destroy(&self, reason: Option<StreamError>) {
        self.core.destroy(reason)
    }

    /// Register a listener. A `Data` listener also resumes the stream.
    pub fn on<F>(&self, kind: EventKind, f: F) -> ListenerId
    where
        F: Fn(&Event<'_, T>) + 'static,
    {
        let id = self.core.listen(kind, false, Rc::new(f));
        if kind == EventKind::Data {
            self.core.resume();
        }
        id
    }

    /// Register a listener that runs at most once.
    pub fn once<F>(&self, kind: EventKind, f: F) -> ListenerId
    where
        F: Fn(&Event<'_, T>) + 'static,
    {
        let id = self.core.listen(kind, true, Rc::new(f));
        if kind == EventKind::Data {
            self.core.resume();
        }
        id
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.core.unlisten(id)
    }

    /// Listen for chunks; resumes the stream.
    pub fn on_data<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&T) + 'static,
    {
        self.core.listen_data(false, f)
    }

    /// Listen for the next chunk only; resumes the stream.
    pub fn once_data<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&T) + 'static,
    {
        self.core.listen_data(true, f)
    }

    pub fn on_error<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&StreamError) + 'static,
    {
        self.core.listen_error(f)
    }

    pub fn is_paused(&self) -> bool {
        self.core.read.state.borrow().paused
    }

    /// True once the producer signalled the end of its data.
    pub fn is_ended(&self) -> bool {
        self.core.read.state.borrow().ended
    }

    pub fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }

    pub fn buffered_len(&self) -> usize {
        self.core.read.state.borrow().buffer.len()
    }
}

type UserRead<T> = Rc<dyn Fn(&Readable<T>, ReadCallback<T>)>;
type UserDestroy<T> = Rc<dyn Fn(&Readable<T>, Callback)>;

/// Builder for `Readable`.
pub struct ReadableBuilder<T: 'static> {
    scheduler: Rc<dyn Scheduler>,
    options: StreamOptions,
    emitter: Option<Box<dyn Emitter<T>>>,
    read: Option<UserRead<T>>,
    destroy: Option<UserDestroy<T>>,
}

impl<T: 'static> ReadableBuilder<T> {
    pub fn new<S>(scheduler: &S) -> Self
    where
        S: Scheduler + Clone + 'static,
    {
        Self {
            scheduler: Rc::new(scheduler.clone()),
            options: StreamOptions::default(),
            emitter: None,
            read: None,
            destroy: None,
        }
    }

    /// Install the read hook. Without one the stream ends on its first pull.
    pub fn with_read<F>(mut self, f: F) -> Self
    where
        F: Fn(&Readable<T>, ReadCallback<T>) + 'static,
    {
        self.read = Some(Rc::new(f));
        self
    }

    /// Install the teardown hook.
    pub fn with_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn(&Readable<T>, Callback) + 'static,
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

    /// Use a custom notification emitter instead of `EventEmitter`.
    pub fn with_emitter(mut self, emitter: impl Emitter<T> + 'static) -> Self {
        self.emitter = Some(Box::new(emitter));
        self
    }

    pub fn build(self) -> Readable<T> {
        let read: ReadHook<T, Infallible> = match self.read {
            Some(f) => Rc::new(move |core: &Rc<Core<T, Infallible>>, cb: ReadCallback<T>| {
                f(&Readable::from_core(core.clone()), cb)
            }),
            None => Rc::new(|_: &Rc<Core<T, Infallible>>, cb: ReadCallback<T>| cb.end()),
        };
        let destroy: UnitHook<T, Infallible> = match self.destroy {
            Some(f) => Rc::new(move |core: &Rc<Core<T, Infallible>>, cb: Callback| {
                f(&Readable::from_core(core.clone()), cb)
            }),
            None => default_destroy(),
        };

        let parts = CoreParts {
            label: self.options.label("readable"),
            events: self
                .emitter
                .unwrap_or_else(|| Box::new(EventEmitter::new())),
            read: ReadSide::new(read, self.options.capacity()),
            write: WriteSide::inert(),
            destroy,
        };
        Readable::from_core(Core::spawn(parts, Some(self.scheduler.as_ref())))
    }
}
