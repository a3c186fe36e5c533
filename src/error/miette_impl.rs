//! Miette integration for pretty error reporting.

use miette::{Diagnostic, Severity};
use thiserror::Error;

use super::{ProtocolViolation, StreamError};

/// A diagnostic wrapper for stream errors compatible with miette.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct StreamDiagnostic {
    /// The error message
    pub message: String,

    #[source]
    /// The underlying error source
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,

    #[help]
    /// Help text for the user
    pub help: Option<String>,

    #[diagnostic(severity)]
    /// Severity level
    pub severity: Severity,
}

impl From<StreamError> for StreamDiagnostic {
    fn from(e: StreamError) -> Self {
        let help = if e.is_premature_close() {
            "The destination closed before the source reached its end"
        } else {
            "A stream hook reported a failure and the stream was destroyed"
        };
        StreamDiagnostic {
            message: format!("stream failed: {}", e),
            source: Some(Box::new(e)),
            help: Some(help.into()),
            severity: Severity::Error,
        }
    }
}

impl From<ProtocolViolation> for StreamDiagnostic {
    fn from(e: ProtocolViolation) -> Self {
        StreamDiagnostic {
            message: format!("pipe misuse: {}", e),
            source: Some(Box::new(e)),
            help: Some("A readable pipes to one destination and a writable accepts one source".into()),
            severity: Severity::Error,
        }
    }
}

impl From<StreamError> for miette::Report {
    fn from(e: StreamError) -> Self {
        miette::Report::new(StreamDiagnostic::from(e))
    }
}
