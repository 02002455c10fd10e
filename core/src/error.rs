//! Error types for a web service connection.
//!
//! # Design
//! Every failure is surfaced synchronously by the call that triggered it; the
//! connection performs no local recovery. `Http` is the primary user-visible
//! failure and keeps the exact status code and reason phrase so the rendered
//! message can be used for diagnostics as-is.

use std::io;

use thiserror::Error;

/// Errors returned by connection, client and sender operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying transport could not be established (DNS, connect).
    #[error("could not open connection: {0}")]
    Open(#[source] io::Error),

    /// I/O failure while writing the request or reading the response.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An operation was attempted after `close()`.
    #[error("connection has been closed")]
    Closed,

    /// The response status is neither a success nor the fault-as-body code.
    #[error("Did not receive successful HTTP response: status code = {status}, status message = [{message}]")]
    Http { status: u16, message: String },

    /// Sender configuration is missing a required value.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl TransportError {
    pub fn configuration<S: ToString>(reason: S) -> Self {
        Self::Configuration(reason.to_string())
    }

    /// Status code carried by an `Http` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
