//! Message sender: creates connections for one endpoint and drives exchanges.
//!
//! # Design
//! `HttpMessageSender` holds a validated `HttpSenderConfig` and a single
//! `ureq::Agent`; every exchange gets a fresh connection. `exchange` works on
//! any `WebServiceConnection`, follows the documented call order and closes
//! the connection whether the exchange succeeds or fails.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

use ::http::Uri;
use tracing::debug;
use ureq::Agent;

use crate::client::{build_agent, UreqClient};
use crate::config::HttpSenderConfig;
use crate::connection::WebServiceConnection;
use crate::error::TransportError;
use crate::http::HttpUrlConnection;
use crate::types::{ReceivedMessage, StatusOutcome};

/// Sends messages to the endpoint named by its configuration.
#[derive(Debug, Clone)]
pub struct HttpMessageSender {
    config: HttpSenderConfig,
    agent: Agent,
}

impl HttpMessageSender {
    pub fn new(config: HttpSenderConfig) -> Self {
        let agent = build_agent(config.timeout());
        Self { config, agent }
    }

    pub fn from_json(json: &str) -> Result<Self, TransportError> {
        HttpSenderConfig::from_json(json).map(Self::new)
    }

    pub fn config(&self) -> &HttpSenderConfig {
        &self.config
    }

    /// Whether `url` uses a scheme this sender can reach.
    pub fn supports(&self, url: &str) -> bool {
        url.parse::<Uri>()
            .ok()
            .and_then(|uri| uri.scheme_str().map(str::to_ascii_lowercase))
            .is_some_and(|scheme| scheme == "http" || scheme == "https")
    }

    /// A fresh, unopened connection to the configured endpoint.
    pub fn create_connection(&self) -> HttpUrlConnection<UreqClient> {
        let client = UreqClient::new(self.agent.clone(), self.config.url())
            .with_connect_timeout(self.config.timeout());
        HttpUrlConnection::new(client, self.config.accept_gzip_encoding())
    }

    /// Send `payload` with `headers` and read the whole response back.
    pub fn send(&self, headers: &[(&str, &str)], payload: &[u8]) -> Result<ReceivedMessage, TransportError> {
        let mut connection = self.create_connection();
        exchange(&mut connection, headers, payload)
    }
}

/// Drive one full exchange over `connection` and close it afterwards.
pub fn exchange<C: WebServiceConnection + ?Sized>(
    connection: &mut C,
    headers: &[(&str, &str)],
    payload: &[u8],
) -> Result<ReceivedMessage, TransportError> {
    let result = run_exchange(connection, headers, payload);
    connection.close();
    result
}

fn run_exchange<C: WebServiceConnection + ?Sized>(
    connection: &mut C,
    headers: &[(&str, &str)],
    payload: &[u8],
) -> Result<ReceivedMessage, TransportError> {
    connection.open()?;
    for (name, value) in headers {
        connection.add_request_header(name, value)?;
    }
    {
        let mut out = connection.request_output_stream()?;
        out.write_all(payload)?;
        out.flush()?;
    }

    let status = connection.response_code()?;
    let content_length = connection.response_content_length()?;
    let names: Vec<String> = connection.response_header_names()?.collect();
    let mut received = BTreeMap::new();
    for name in names {
        let values: BTreeSet<String> = connection.response_headers(&name)?.collect();
        received.insert(name, values);
    }

    let mut body = Vec::new();
    connection.response_input_stream()?.read_to_end(&mut body)?;
    debug!(status, bytes = body.len(), "exchange complete");

    Ok(ReceivedMessage {
        status,
        outcome: StatusOutcome::from_code(status),
        content_length,
        headers: received,
        body,
    })
}
