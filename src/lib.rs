//! # flowio
//!
//! Backpressure-aware stream primitives for single-threaded, callback-driven
//! code.
//!
//! ## Overview
//!
//! flowio provides:
//! - **Readable**: pulls chunks from a read hook, buffers them and emits them in order
//! - **Writable**: feeds chunks to a write hook one at a time, with `drain` backpressure and cork/uncork batching
//! - **Duplex**: a readable and a writable sharing one lifecycle
//! - **Transform**: a duplex running each written chunk through a transform hook
//! - **Piping**: linking a readable to any `Sink`, with flow control and a single-fire completion callback
//! - **Teardown**: an idempotent `destroy` that runs the destroy hook once and cascades across piped streams
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bytes::Bytes;
//! use flowio::{InMemorySource, TickQueue, Transform, Writable};
//!
//! let ticks = TickQueue::new();
//! let source = InMemorySource::new("in", vec![Bytes::from("a"), Bytes::from("b")]).open(&ticks);
//! let upper = Transform::builder(&ticks, |_, chunk: Bytes, cb| {
//!     cb.chunk(Bytes::from(chunk.to_ascii_uppercase()))
//! })
//! .build();
//! let sink = Writable::builder()
//!     .with_write(|_, chunk: Bytes, cb| {
//!         println!("{chunk:?}");
//!         cb.done()
//!     })
//!     .build();
//!
//! source.pipe(&upper)?;
//! upper.pipe(&sink)?;
//! ticks.run_until_idle();
//! ```
//!
//! ## Scheduling
//!
//! Streams never spawn work on their own. The first pull of a readable is
//! deferred through the `Scheduler` it was built with, so listeners can be
//! attached before any data flows. `TickQueue` is a manual run queue that
//! the owner drains; `TokioScheduler` (feature `async`) defers onto a tokio
//! `LocalSet`.
//!
//! ## Features
//!
//! - `async` - `TokioScheduler` and `ReadableStream`, a `futures::Stream` bridge
//! - `miette` - Pretty error reporting with miette

pub mod callback;
pub mod config;
pub mod error;
pub mod event;
pub mod io;
pub mod pipe;
pub mod sched;
pub mod stream;

pub use callback::{Callback, ReadCallback, ReadOutcome, TransformCallback};
pub use config::{DEFAULT_HIGH_WATER_MARK, StreamOptions};
pub use error::{ProtocolViolation, StreamError};
pub use event::{Emitter, Event, EventEmitter, EventKind, Listener, ListenerId};
pub use io::{InMemorySink, InMemorySource};
pub use pipe::{PipeCallback, SignalListener, Sink, SinkSignal};
pub use sched::{Scheduler, Task, TickQueue};
pub use stream::{
    Duplex, DuplexBuilder, Readable, ReadableBuilder, Transform, TransformBuilder, Writable,
    WritableBuilder,
};

#[cfg(feature = "async")]
pub use io::ReadableStream;
#[cfg(feature = "async")]
pub use sched::TokioScheduler;

// Miette re-exports
#[cfg(feature = "miette")]
pub use error::StreamDiagnostic;

// Internal test modules (see src/tests)
#[cfg(test)]
mod tests;
