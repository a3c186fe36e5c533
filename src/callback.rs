//! Completion handles passed to user hooks.
//!
//! Every hook receives a handle that it must complete exactly once, either
//! synchronously before returning or later from deferred work. Completion
//! consumes the handle, so completing twice does not compile.

use std::fmt;

use crate::error::StreamError;

/// What a read hook produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome<T> {
    /// A chunk to push into the readable.
    Chunk(T),
    /// The producer has no more data.
    End,
    /// Nothing this time; the hook may already have pushed chunks itself.
    Pending,
}

/// Completion for a read hook.
pub struct ReadCallback<T> {
    inner: Box<dyn FnOnce(Result<ReadOutcome<T>, StreamError>)>,
}

impl<T> ReadCallback<T> {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: FnOnce(Result<ReadOutcome<T>, StreamError>) + 'static,
    {
        Self { inner: Box::new(f) }
    }

    /// Complete with an explicit result.
    pub fn complete(self, result: Result<ReadOutcome<T>, StreamError>) {
        (self.inner)(result)
    }

    /// Complete with a chunk.
    pub fn chunk(self, chunk: impl Into<T>) {
        self.complete(Ok(ReadOutcome::Chunk(chunk.into())))
    }

    /// Complete with a chunk if there is one, otherwise signal the end.
    pub fn chunk_or_end(self, chunk: Option<T>) {
        match chunk {
            Some(chunk) => self.complete(Ok(ReadOutcome::Chunk(chunk))),
            None => self.end(),
        }
    }

    /// Signal that the producer is exhausted.
    pub fn end(self) {
        self.complete(Ok(ReadOutcome::End))
    }

    /// Complete without producing anything.
    pub fn done(self) {
        self.complete(Ok(ReadOutcome::Pending))
    }

    /// Fail the read; the readable is destroyed with `error`.
    pub fn fail(self, error: impl Into<StreamError>) {
        self.complete(Err(error.into()))
    }
}

impl<T> fmt::Debug for ReadCallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadCallback").finish_non_exhaustive()
    }
}

/// Completion for write, end and destroy hooks.
pub struct Callback {
    inner: Box<dyn FnOnce(Result<(), StreamError>)>,
}

impl Callback {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: FnOnce(Result<(), StreamError>) + 'static,
    {
        Self { inner: Box::new(f) }
    }

    /// Complete with an explicit result.
    pub fn complete(self, result: Result<(), StreamError>) {
        (self.inner)(result)
    }

    /// Complete successfully.
    pub fn done(self) {
        self.complete(Ok(()))
    }

    /// Complete with a failure.
    pub fn fail(self, error: impl Into<StreamError>) {
        self.complete(Err(error.into()))
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

/// Completion for a transform hook.
pub struct TransformCallback<O> {
    inner: Box<dyn FnOnce(Result<Option<O>, StreamError>)>,
}

impl<O> TransformCallback<O> {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: FnOnce(Result<Option<O>, StreamError>) + 'static,
    {
        Self { inner: Box::new(f) }
    }

    /// Complete with an explicit result.
    pub fn complete(self, result: Result<Option<O>, StreamError>) {
        (self.inner)(result)
    }

    /// Complete with the transformed chunk.
    pub fn chunk(self, chunk: impl Into<O>) {
        self.complete(Ok(Some(chunk.into())))
    }

    /// Complete without output for this input.
    pub fn skip(self) {
        self.complete(Ok(None))
    }

    /// Fail the transform; the stream is destroyed with `error`.
    pub fn fail(self, error: impl Into<StreamError>) {
        self.complete(Err(error.into()))
    }
}

impl<O> fmt::Debug for TransformCallback<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformCallback").finish_non_exhaustive()
    }
}
