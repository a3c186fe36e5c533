//! Adapters between streams and the outside world.
//!
//! This module provides:
//! - `InMemorySource`: preset chunks opened as a `Readable`
//! - `InMemorySink`: a generic `Sink` collecting chunks
//! - `ReadableStream`: a `futures::Stream` over a `Readable` (`async` feature)

mod memory;

pub use memory::{InMemorySink, InMemorySource};

#[cfg(feature = "async")]
mod async_stream;

#[cfg(feature = "async")]
pub use async_stream::ReadableStream;
