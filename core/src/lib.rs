//! Connection-agnostic HTTP exchange for structured messages.
//!
//! # Overview
//! Carries one message (e.g. a SOAP envelope) over one HTTP request/response
//! exchange. `WebServiceConnection` is the capability contract callers use;
//! `HttpUrlConnection` binds it to any `BlockingHttpClient`, and `UreqClient`
//! provides that primitive over ureq.
//!
//! # Design
//! - A connection is used once: open, write headers and body, commit, read
//!   status, headers and body, close. The request is committed lazily by the
//!   first response accessor.
//! - Status 2xx reads the normal body, 500 reads the fault body, anything
//!   else is `TransportError::Http` with the exact code and reason phrase.
//! - Closing releases the client handle; `Drop` closes as well.
//! - `HttpSenderConfig` is immutable and validated once; `HttpMessageSender`
//!   creates a connection per exchange.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod sender;
pub mod types;

pub use client::{BlockingHttpClient, UreqClient, FIRST_HEADER_INDEX};
pub use config::{HttpSenderConfig, HttpSenderConfigBuilder};
pub use connection::{HeaderNames, HeaderValues, WebServiceConnection};
pub use error::TransportError;
pub use http::HttpUrlConnection;
pub use sender::{exchange, HttpMessageSender};
pub use types::{ReceivedMessage, StatusOutcome};
