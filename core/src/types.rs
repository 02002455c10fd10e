//! Plain data shared by the connection contract and its bindings.
//!
//! # Design
//! The status outcome is derived from the numeric code on demand and never
//! stored on a connection. Header values are collected into a `BTreeSet` so
//! duplicates collapse and iteration order does not depend on the server.

use std::collections::{BTreeMap, BTreeSet};

/// Status code whose body is still read as a fault payload.
pub const FAULT_STATUS: u16 = 500;

/// Classification of an HTTP response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// 200..=299, the body is read from the normal input stream.
    Success,
    /// 500, the body carries an application-level fault and is read from the
    /// error stream.
    Fault,
    /// Any other code.
    Error,
}

impl StatusOutcome {
    /// Classify `code`. The fault code is checked before the success range.
    pub fn from_code(code: u16) -> Self {
        if code == FAULT_STATUS {
            StatusOutcome::Fault
        } else if (200..300).contains(&code) {
            StatusOutcome::Success
        } else {
            StatusOutcome::Error
        }
    }
}

/// Split a raw header value on commas into distinct, trimmed tokens.
pub fn split_header_values(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether a `Content-Encoding` value names gzip among its codings.
pub fn is_gzip_encoding(raw: &str) -> bool {
    raw.split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("gzip"))
}

/// Everything read back from one completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub status: u16,
    pub outcome: StatusOutcome,
    /// `None` when the server did not announce a length.
    pub content_length: Option<u64>,
    pub headers: BTreeMap<String, BTreeSet<String>>,
    pub body: Vec<u8>,
}

impl ReceivedMessage {
    /// Whether the body is an application-level fault.
    pub fn is_fault(&self) -> bool {
        self.outcome == StatusOutcome::Fault
    }

    /// Values of a response header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    }
}
