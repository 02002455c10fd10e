//! Immutable configuration for an HTTP message sender.
//!
//! # Design
//! The endpoint URL and the gzip preference are fixed at construction and
//! validated once, so a sender never observes a half-configured state. The
//! same validation runs for values built in code and values read from JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Settings shared by every connection a sender creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConfig", into = "RawConfig")]
pub struct HttpSenderConfig {
    url: String,
    accept_gzip_encoding: bool,
    timeout: Option<Duration>,
}

/// On-disk shape of `HttpSenderConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    url: Option<String>,
    #[serde(default = "default_accept_gzip_encoding")]
    accept_gzip_encoding: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

fn default_accept_gzip_encoding() -> bool {
    true
}

impl HttpSenderConfig {
    pub fn builder() -> HttpSenderConfigBuilder {
        HttpSenderConfigBuilder::default()
    }

    /// Read and validate a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, TransportError> {
        serde_json::from_str(json).map_err(TransportError::configuration)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether connections send `Accept-Encoding: gzip`.
    pub fn accept_gzip_encoding(&self) -> bool {
        self.accept_gzip_encoding
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl TryFrom<RawConfig> for HttpSenderConfig {
    type Error = TransportError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            url: validate_url(raw.url)?,
            accept_gzip_encoding: raw.accept_gzip_encoding,
            timeout: validate_timeout(raw.timeout_ms.map(Duration::from_millis))?,
        })
    }
}

impl From<HttpSenderConfig> for RawConfig {
    fn from(config: HttpSenderConfig) -> Self {
        Self {
            url: Some(config.url),
            accept_gzip_encoding: config.accept_gzip_encoding,
            timeout_ms: config
                .timeout
                .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

fn validate_url(url: Option<String>) -> Result<String, TransportError> {
    match url {
        Some(url) if !url.trim().is_empty() => Ok(url.trim().to_string()),
        _ => Err(TransportError::configuration("url is required")),
    }
}

/// Timeouts are kept at millisecond precision; anything shorter would
/// expire every request.
fn validate_timeout(timeout: Option<Duration>) -> Result<Option<Duration>, TransportError> {
    match timeout {
        Some(timeout) if timeout < Duration::from_millis(1) => Err(TransportError::configuration(
            "timeout must be at least 1 millisecond",
        )),
        other => Ok(other),
    }
}

/// Builder for `HttpSenderConfig`. Gzip is accepted unless turned off.
#[derive(Debug, Clone, Default)]
pub struct HttpSenderConfigBuilder {
    url: Option<String>,
    accept_gzip_encoding: Option<bool>,
    timeout: Option<Duration>,
}

impl HttpSenderConfigBuilder {
    pub fn url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn accept_gzip_encoding(mut self, accept: bool) -> Self {
        self.accept_gzip_encoding = Some(accept);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<HttpSenderConfig, TransportError> {
        Ok(HttpSenderConfig {
            url: validate_url(self.url)?,
            accept_gzip_encoding: self.accept_gzip_encoding.unwrap_or_else(default_accept_gzip_encoding),
            timeout: validate_timeout(self.timeout)?,
        })
    }
}
