//! A readable and a writable sharing one core.

use std::fmt;
use std::rc::Rc;

use super::{Core, CoreParts, ReadHook, ReadSide, UnitHook, WriteHook, WriteSide, default_destroy};
use crate::callback::{Callback, ReadCallback};
use crate::config::StreamOptions;
use crate::error::{ProtocolViolation, StreamError};
use crate::event::{Emitter, Event, EventEmitter, EventKind, ListenerId};
use crate::pipe::{LinkableSink, SignalListener, Sink, SinkSignal};
use crate::sched::Scheduler;

/// Produces `R` chunks and consumes `W` chunks.
///
/// Both halves share one set of listeners and one teardown: the stream is
/// destroyed once the write half has finished and the read half has ended,
/// and the destroy hook, `error` and `close` happen once for the pair.
/// Unless the stream is half-open, finishing the write half also ends the
/// read half.
pub struct Duplex<R: 'static, W: 'static> {
    pub(crate) core: Rc<Core<R, W>>,
}

impl<R: 'static, W: 'static> Clone for Duplex<R, W> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<R: 'static, W: 'static> fmt::Debug for Duplex<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rs = self.core.read.state.borrow();
        let ws = self.core.write.state.borrow();
        f.debug_struct("Duplex")
            .field("name", &self.core.label)
            .field("read_buffered", &rs.buffer.len())
            .field("write_buffered", &ws.buffer.len())
            .field("paused", &rs.paused)
            .field("corked", &ws.corked)
            .field("destroyed", &self.core.is_destroyed())
            .finish()
    }
}

impl<R: 'static, W: 'static> Duplex<R, W> {
    pub fn builder<S>(scheduler: &S) -> DuplexBuilder<R, W>
    where
        S: Scheduler + Clone + 'static,
    {
        DuplexBuilder::new(scheduler)
    }

    pub(crate) fn from_core(core: Rc<Core<R, W>>) -> Self {
        Self { core }
    }

    pub fn push(&self, chunk: impl Into<R>) -> bool {
        self.core.push(chunk.into())
    }

    pub fn push_end(&self) -> bool {
        self.core.push_end()
    }

    pub fn read(&self) -> Option<R> {
        self.core.read()
    }

    pub fn pause(&self) {
        self.core.pause()
    }

    pub fn resume(&self) {
        self.core.resume()
    }

    pub fn pipe<S>(&self, destination: &S) -> Result<S, ProtocolViolation>
    where
        S: Sink<R> + Clone + 'static,
    {
        self.core.pipe(Rc::new(destination.clone()), None)?;
        Ok(destination.clone())
    }

    pub fn pipe_with<S, F>(&self, destination: &S, done: F) -> Result<S, ProtocolViolation>
    where
        S: Sink<R> + Clone + 'static,
        F: FnOnce(Result<(), StreamError>) + 'static,
    {
        self.core.pipe(Rc::new(destination.clone()), Some(Box::new(done)))?;
        Ok(destination.clone())
    }

    pub fn write(&self, chunk: impl Into<W>) -> bool {
        self.core.write(chunk.into())
    }

    pub fn end(&self) {
        self.core.end(None)
    }

    pub fn end_with(&self, chunk: impl Into<W>) {
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

    /// Destroy only if the write half has finished and the read half has
    /// ended. Runs automatically after either event.
    pub fn destroy_maybe(&self) {
        self.core.destroy_maybe()
    }

    pub fn on<F>(&self, kind: EventKind, f: F) -> ListenerId
    where
        F: Fn(&Event<'_, R>) + 'static,
    {
        let id = self.core.listen(kind, false, Rc::new(f));
        if kind == EventKind::Data {
            self.core.resume();
        }
        id
    }

    pub fn once<F>(&self, kind: EventKind, f: F) -> ListenerId
    where
        F: Fn(&Event<'_, R>) + 'static,
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

    pub fn on_data<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&R) + 'static,
    {
        self.core.listen_data(false, f)
    }

    /// Listen for the next chunk only; resumes the read side.
    pub fn once_data<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&R) + 'static,
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

    pub fn is_ended(&self) -> bool {
        self.core.read.state.borrow().ended
    }

    pub fn is_corked(&self) -> bool {
        self.core.write.state.borrow().corked
    }

    pub fn is_finished(&self) -> bool {
        self.core.write.state.borrow().finish_emitted
    }

    pub fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }

    /// Chunks waiting in the read buffer.
    pub fn buffered_len(&self) -> usize {
        self.core.read.state.borrow().buffer.len()
    }

    /// Chunks waiting in the write buffer.
    pub fn write_buffered_len(&self) -> usize {
        self.core.write.state.borrow().buffer.len()
    }
}

impl<R: 'static, W: 'static> Sink<W> for Duplex<R, W> {
    fn write(&self, chunk: W) -> bool {
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

type UserRead<R, W> = Rc<dyn Fn(&Duplex<R, W>, ReadCallback<R>)>;
type UserWrite<R, W> = Rc<dyn Fn(&Duplex<R, W>, W, Callback)>;
type UserUnit<R, W> = Rc<dyn Fn(&Duplex<R, W>, Callback)>;

/// Builder for `Duplex`.
pub struct DuplexBuilder<R: 'static, W: 'static> {
    scheduler: Rc<dyn Scheduler>,
    options: StreamOptions,
    emitter: Option<Box<dyn Emitter<R>>>,
    read: Option<UserRead<R, W>>,
    write: Option<UserWrite<R, W>>,
    end: Option<UserUnit<R, W>>,
    destroy: Option<UserUnit<R, W>>,
}

impl<R: 'static, W: 'static> DuplexBuilder<R, W> {
    pub fn new<S>(scheduler: &S) -> Self
    where
        S: Scheduler + Clone + 'static,
    {
        Self {
            scheduler: Rc::new(scheduler.clone()),
            options: StreamOptions::default(),
            emitter: None,
            read: None,
            write: None,
            end: None,
            destroy: None,
        }
    }

    pub fn with_read<F>(mut self, f: F) -> Self
    where
        F: Fn(&Duplex<R, W>, ReadCallback<R>) + 'static,
    {
        self.read = Some(Rc::new(f));
        self
    }

    pub fn with_write<F>(mut self, f: F) -> Self
    where
        F: Fn(&Duplex<R, W>, W, Callback) + 'static,
    {
        self.write = Some(Rc::new(f));
        self
    }

    pub fn with_end<F>(mut self, f: F) -> Self
    where
        F: Fn(&Duplex<R, W>, Callback) + 'static,
    {
        self.end = Some(Rc::new(f));
        self
    }

    pub fn with_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn(&Duplex<R, W>, Callback) + 'static,
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

    /// When false, finishing the write half also ends the read half.
    pub fn with_half_open(mut self, half_open: bool) -> Self {
        self.options.half_open = half_open;
        self
    }

    pub fn with_emitter(mut self, emitter: impl Emitter<R> + 'static) -> Self {
        self.emitter = Some(Box::new(emitter));
        self
    }

    pub fn build(self) -> Duplex<R, W> {
        let read: ReadHook<R, W> = match self.read {
            Some(f) => Rc::new(move |core: &Rc<Core<R, W>>, cb: ReadCallback<R>| {
                f(&Duplex::from_core(core.clone()), cb)
            }),
            None => Rc::new(|_: &Rc<Core<R, W>>, cb: ReadCallback<R>| cb.end()),
        };
        let write: WriteHook<R, W> = match self.write {
            Some(f) => Rc::new(move |core: &Rc<Core<R, W>>, chunk: W, cb: Callback| {
                f(&Duplex::from_core(core.clone()), chunk, cb)
            }),
            None => Rc::new(|_: &Rc<Core<R, W>>, _: W, cb: Callback| cb.done()),
        };

        let parts = CoreParts {
            label: self.options.label("duplex"),
            events: self
                .emitter
                .unwrap_or_else(|| Box::new(EventEmitter::new())),
            read: ReadSide::new(read, self.options.capacity()),
            write: WriteSide::new(
                write,
                wrap_unit(self.end),
                self.options.capacity(),
                self.options.half_open,
            ),
            destroy: wrap_unit(self.destroy),
        };
        Duplex::from_core(Core::spawn(parts, Some(self.scheduler.as_ref())))
    }
}

fn wrap_unit<R: 'static, W: 'static>(hook: Option<UserUnit<R, W>>) -> UnitHook<R, W> {
    match hook {
        Some(f) => Rc::new(move |core: &Rc<Core<R, W>>, cb: Callback| {
            f(&Duplex::from_core(core.clone()), cb)
        }),
        None => default_destroy(),
    }
}
