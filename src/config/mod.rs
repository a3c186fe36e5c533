//! Construction options shared by every stream kind.
//!
//! `StreamOptions` deserializes from any serde format, so options can live in
//! the same configuration documents as the rest of an application:
//!
//! ```yaml
//! name: upload
//! high_water_mark: 32
//! half_open: false
//! ```

use serde::Deserialize;

/// Default soft capacity of a stream buffer, in chunks.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16;

/// Options recognized when building a stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Label used in tracing output
    pub name: Option<String>,
    /// Buffer length at which `push`/`write` start signalling backpressure
    pub high_water_mark: usize,
    /// Whether finishing the write side leaves the read side open
    pub half_open: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            name: None,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            half_open: true,
        }
    }
}

impl StreamOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tracing label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the buffer soft capacity. Zero is clamped to one.
    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark;
        self
    }

    /// Set the half-open behavior.
    pub fn with_half_open(mut self, half_open: bool) -> Self {
        self.half_open = half_open;
        self
    }

    /// The effective soft capacity, never below one.
    pub(crate) fn capacity(&self) -> usize {
        self.high_water_mark.max(1)
    }

    /// The label for tracing output, falling back to the stream kind.
    pub(crate) fn label(&self, kind: &'static str) -> String {
        self.name.clone().unwrap_or_else(|| kind.to_string())
    }
}
