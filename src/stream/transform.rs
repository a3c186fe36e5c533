//! A duplex that maps each written chunk to at most one readable chunk.

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use super::{Duplex, DuplexBuilder};
use crate::callback::{Callback, ReadCallback, TransformCallback};
use crate::config::StreamOptions;
use crate::error::StreamError;
use crate::event::{Emitter, ListenerId};
use crate::pipe::{LinkableSink, SignalListener, Sink, SinkSignal};
use crate::sched::Scheduler;

type TransformFn<I, O> = Rc<dyn Fn(&Transform<I, O>, I, TransformCallback<O>)>;
type UserUnit<I, O> = Rc<dyn Fn(&Transform<I, O>, Callback)>;

/// Pending halves of one transformation. The hook runs only when a written
/// chunk and a read demand are both waiting.
struct TransformState<I, O> {
    write_data: Option<I>,
    write_cb: Option<Callback>,
    read_cb: Option<ReadCallback<O>>,
}

impl<I, O> Default for TransformState<I, O> {
    fn default() -> Self {
        Self {
            write_data: None,
            write_cb: None,
            read_cb: None,
        }
    }
}

type SharedState<I, O> = Rc<RefCell<TransformState<I, O>>>;

/// Consumes `I` chunks, runs each through the transform hook and produces
/// the results as `O` chunks, in input order.
///
/// A transform is never half-open: once the write side finishes, the read
/// side ends. Every duplex operation is available through `Deref`.
pub struct Transform<I: 'static, O: 'static> {
    inner: Duplex<O, I>,
}

impl<I: 'static, O: 'static> Clone for Transform<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I: 'static, O: 'static> fmt::Debug for Transform<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transform").field(&self.inner).finish()
    }
}

impl<I: 'static, O: 'static> Deref for Transform<I, O> {
    type Target = Duplex<O, I>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<I: 'static, O: 'static> Transform<I, O> {
    /// Start building a transform around `transform`.
    pub fn builder<S, F>(scheduler: &S, transform: F) -> TransformBuilder<I, O>
    where
        S: Scheduler + Clone + 'static,
        F: Fn(&Transform<I, O>, I, TransformCallback<O>) + 'static,
    {
        TransformBuilder::new(scheduler, transform)
    }

    fn from_duplex(inner: Duplex<O, I>) -> Self {
        Self { inner }
    }

    /// The underlying duplex handle.
    pub fn as_duplex(&self) -> &Duplex<O, I> {
        &self.inner
    }
}

impl<T: 'static> Transform<T, T> {
    /// A transform that forwards every chunk unchanged.
    pub fn passthrough<S>(scheduler: &S) -> Self
    where
        S: Scheduler + Clone + 'static,
    {
        TransformBuilder::new(scheduler, |_, chunk, cb: TransformCallback<T>| {
            cb.complete(Ok(Some(chunk)))
        })
        .with_name("passthrough")
        .build()
    }
}

impl<I: 'static, O: 'static> Sink<I> for Transform<I, O> {
    fn write(&self, chunk: I) -> bool {
        Sink::write(&self.inner, chunk)
    }

    fn end(&self) {
        Sink::end(&self.inner)
    }

    fn destroy(&self, reason: Option<StreamError>) {
        Sink::destroy(&self.inner, reason)
    }

    fn subscribe(&self, signal: SinkSignal, listener: SignalListener) -> ListenerId {
        self.inner.subscribe(signal, listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.inner.unsubscribe(id)
    }

    fn as_linkable(&self) -> Option<&dyn LinkableSink> {
        self.inner.as_linkable()
    }
}

fn run_transform<I: 'static, O: 'static>(
    stream: &Duplex<O, I>,
    state: &SharedState<I, O>,
    transform: &TransformFn<I, O>,
) {
    let data = {
        let mut st = state.borrow_mut();
        if st.write_cb.is_none() || st.read_cb.is_none() {
            return;
        }
        match st.write_data.take() {
            Some(data) => data,
            None => return,
        }
    };

    let this = stream.clone();
    let pending = state.clone();
    transform(
        &Transform::from_duplex(stream.clone()),
        data,
        TransformCallback::new(move |result| after_transform(&this, &pending, result)),
    );
}

fn after_transform<I: 'static, O: 'static>(
    stream: &Duplex<O, I>,
    state: &SharedState<I, O>,
    result: Result<Option<O>, StreamError>,
) {
    let output = match result {
        Ok(output) => output,
        Err(err) => return stream.core.fail("transform", err),
    };
    if let Some(chunk) = output {
        stream.core.push(chunk);
    }

    let (write_cb, read_cb) = {
        let mut st = state.borrow_mut();
        (st.write_cb.take(), st.read_cb.take())
    };
    if let Some(cb) = write_cb {
        cb.done();
    }
    if let Some(cb) = read_cb {
        cb.done();
    }
}

/// Builder for `Transform`.
pub struct TransformBuilder<I: 'static, O: 'static> {
    inner: DuplexBuilder<O, I>,
    transform: TransformFn<I, O>,
    flush: Option<UserUnit<I, O>>,
    destroy: Option<UserUnit<I, O>>,
}

impl<I: 'static, O: 'static> TransformBuilder<I, O> {
    pub fn new<S, F>(scheduler: &S, transform: F) -> Self
    where
        S: Scheduler + Clone + 'static,
        F: Fn(&Transform<I, O>, I, TransformCallback<O>) + 'static,
    {
        Self {
            inner: DuplexBuilder::new(scheduler),
            transform: Rc::new(transform),
            flush: None,
            destroy: None,
        }
    }

    /// Runs once after the last written chunk was transformed, before
    /// `finish`. The hook may push trailing chunks.
    pub fn with_flush<F>(mut self, f: F) -> Self
    where
        F: Fn(&Transform<I, O>, Callback) + 'static,
    {
        self.flush = Some(Rc::new(f));
        self
    }

    pub fn with_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn(&Transform<I, O>, Callback) + 'static,
    {
        self.destroy = Some(Rc::new(f));
        self
    }

    /// `half_open` is ignored; transforms always end their read side on
    /// finish.
    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.inner = self.inner.with_options(options);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.inner = self.inner.with_name(name);
        self
    }

    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.inner = self.inner.with_high_water_mark(high_water_mark);
        self
    }

    pub fn with_emitter(mut self, emitter: impl Emitter<O> + 'static) -> Self {
        self.inner = self.inner.with_emitter(emitter);
        self
    }

    pub fn build(self) -> Transform<I, O> {
        let state: SharedState<I, O> = Rc::new(RefCell::new(TransformState::default()));

        let write_state = state.clone();
        let write_fn = self.transform.clone();
        let read_state = state.clone();
        let read_fn = self.transform;
        let destroy_state = state;
        let flush = self.flush;
        let destroy = self.destroy;

        let duplex = self
            .inner
            .with_write(move |stream, chunk, cb| {
                {
                    let mut st = write_state.borrow_mut();
                    st.write_data = Some(chunk);
                    st.write_cb = Some(cb);
                }
                run_transform(stream, &write_state, &write_fn);
            })
            .with_read(move |stream, cb| {
                read_state.borrow_mut().read_cb = Some(cb);
                run_transform(stream, &read_state, &read_fn);
            })
            .with_end(move |stream, cb| match &flush {
                Some(flush) => flush(&Transform::from_duplex(stream.clone()), cb),
                None => cb.done(),
            })
            .with_destroy(move |stream, cb| {
                // Drop parked completions; they hold the core alive.
                let parked = std::mem::take(&mut *destroy_state.borrow_mut());
                drop(parked);
                match &destroy {
                    Some(destroy) => destroy(&Transform::from_duplex(stream.clone()), cb),
                    None => cb.done(),
                }
            })
            .with_half_open(false)
            .build();

        Transform::from_duplex(duplex)
    }
}
