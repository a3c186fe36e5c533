//! Error types for stream operations.
//!
//! This module provides:
//! - `StreamError`: A data-path failure carried by `error` notifications,
//!   destroy reasons and pipe completion callbacks
//! - `ProtocolViolation`: Misuse of the pipe protocol, returned synchronously

use std::sync::Arc;

use thiserror::Error;

/// A failure travelling through the stream data path.
///
/// Every data-path failure ends up in `destroy`, which makes it the reason
/// reported by the `error` notification and by any outstanding pipe callback.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The consumer side of a linked pair closed before the producer ended.
    #[error("stream closed prematurely")]
    PrematureClose,

    /// A plain failure message, usually produced by a user hook.
    #[error("{0}")]
    Message(String),

    /// Any other error, shared so it can be reported in several places.
    #[error("{0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl StreamError {
    /// Create an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        StreamError::Message(message.into())
    }

    /// Wrap an arbitrary error.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StreamError::Other(Arc::new(error))
    }

    /// Check whether this is a synthesized premature-close failure.
    pub fn is_premature_close(&self) -> bool {
        matches!(self, StreamError::PrematureClose)
    }
}

impl From<std::io::Error> for StreamError {
    fn from(error: std::io::Error) -> Self {
        StreamError::other(error)
    }
}

impl From<&str> for StreamError {
    fn from(message: &str) -> Self {
        StreamError::msg(message)
    }
}

impl From<String> for StreamError {
    fn from(message: String) -> Self {
        StreamError::Message(message)
    }
}

/// Misuse of the pipe protocol.
///
/// These are programming errors, not runtime failures: they are returned at
/// the point of misuse and never routed through `destroy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// The readable already has a destination.
    #[error("can only pipe a stream once")]
    AlreadyPiped,

    /// The writable is already fed by another readable.
    #[error("can only pipe a single stream to a writable one")]
    SinkAlreadySourced,
}

#[cfg(feature = "miette")]
mod miette_impl;

#[cfg(feature = "miette")]
pub use miette_impl::*;
