//! The capability set every connection binding implements.
//!
//! # Design
//! A connection models exactly one request/response exchange and is driven
//! in a fixed order:
//!
//! ```text
//! open -> add_request_header* -> request_output_stream (write, flush)
//!      -> response_code -> response_header_names / response_headers*
//!      -> response_input_stream -> close
//! ```
//!
//! Nothing crosses the wire until the first response accessor commits the
//! request. Calling a read operation before the body has been written is
//! outside the contract. After `close()` every operation except `close()`
//! itself fails with `TransportError::Closed`.
//!
//! The trait is object safe so callers can hold a `&mut dyn
//! WebServiceConnection` without knowing the binding.

use std::collections::btree_set;
use std::io::{Read, Write};

use crate::error::TransportError;
use crate::types::StatusOutcome;

/// Lazy, finite, non-restartable sequence of distinct response header names.
pub type HeaderNames<'a> = Box<dyn Iterator<Item = String> + 'a>;

/// Distinct values of one response header.
pub type HeaderValues = btree_set::IntoIter<String>;

pub trait WebServiceConnection {
    /// Establish the underlying transport. Must be called once, before any write.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Append a request header. Repeated names accumulate.
    fn add_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError>;

    /// Sink for the outbound message body.
    fn request_output_stream(&mut self) -> Result<Box<dyn Write + '_>, TransportError>;

    /// Numeric status of the response, committing the request if needed.
    fn response_code(&mut self) -> Result<u16, TransportError>;

    /// Announced body length, `None` when unknown.
    fn response_content_length(&mut self) -> Result<Option<u64>, TransportError>;

    fn response_header_names(&mut self) -> Result<HeaderNames<'_>, TransportError>;

    /// Values of header `name`; empty when the header is absent.
    fn response_headers(&mut self, name: &str) -> Result<HeaderValues, TransportError>;

    /// Body of the response, selected by status classification: the fault
    /// stream for 500, the normal stream for 2xx, `TransportError::Http`
    /// otherwise.
    fn response_input_stream(&mut self) -> Result<Box<dyn Read + '_>, TransportError>;

    /// Release the transport. Idempotent and infallible.
    fn close(&mut self);

    fn is_closed(&self) -> bool;

    /// Classification of the response status.
    fn response_outcome(&mut self) -> Result<StatusOutcome, TransportError> {
        self.response_code().map(StatusOutcome::from_code)
    }
}
