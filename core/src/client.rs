//! Blocking HTTP client primitive and its ureq realization.
//!
//! # Design
//! `BlockingHttpClient` is the only boundary between a connection binding and
//! the network. It mirrors a classic blocking URL connection: headers and the
//! body are buffered, and the first response accessor commits the request.
//!
//! Positional header access uses a fixed offset: index 0 is the status line
//! (it has no key), real headers start at index 1, and the first index
//! without a key marks the end. Positional and by-name accessors only see
//! data once the response is available.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use ::http::Uri;
use tracing::{debug, trace};
use ureq::{Agent, AgentBuilder, ErrorKind, Response};

/// Index of the first real header in positional enumeration; index 0 is the
/// status line.
pub const FIRST_HEADER_INDEX: usize = 1;

pub trait BlockingHttpClient {
    fn connect(&mut self) -> io::Result<()>;

    fn disconnect(&mut self);

    fn add_request_property(&mut self, name: &str, value: &str) -> io::Result<()>;

    fn output_stream(&mut self) -> io::Result<Box<dyn Write + '_>>;

    fn response_code(&mut self) -> io::Result<u16>;

    /// Reason phrase of the status line, if any.
    fn response_message(&mut self) -> io::Result<Option<String>>;

    /// Announced body length, -1 when unknown.
    fn content_length(&mut self) -> io::Result<i64>;

    fn input_stream(&mut self) -> io::Result<Box<dyn Read + '_>>;

    /// Body of an error response, if the server sent one.
    fn error_stream(&mut self) -> Option<Box<dyn Read + '_>>;

    /// Value of header `name`, repeated fields joined with `", "`.
    fn header_field(&self, name: &str) -> Option<String>;

    fn header_field_key(&self, index: usize) -> Option<&str>;

    fn header_field_at(&self, index: usize) -> Option<&str>;
}

/// Agent suited to `UreqClient`: redirects are not followed, so a 3xx
/// reaches status classification.
pub fn build_agent(timeout: Option<Duration>) -> Agent {
    let mut builder = AgentBuilder::new().redirects(0);
    if let Some(timeout) = timeout {
        builder = builder.timeout_connect(timeout).timeout(timeout);
    }
    builder.build()
}

/// `BlockingHttpClient` over a blocking `ureq::Agent`. Sends a `POST` to `url`.
///
/// `connect` resolves the URL and opens a TCP connection to check that the
/// endpoint is reachable, then drops it. ureq opens its own connection when
/// the request is committed, so the server sees two connections per
/// exchange: an empty one from `connect`, then the one carrying the request.
///
/// The connect timeout bounds each address tried by `connect`; the agent's
/// own timeout covers the request itself. Name resolution is not bounded.
pub struct UreqClient {
    agent: Agent,
    url: String,
    connect_timeout: Option<Duration>,
    request_headers: Vec<(String, String)>,
    body: Vec<u8>,
    connected: bool,
    response: Option<ReceivedResponse>,
}

struct ReceivedResponse {
    status: u16,
    reason: Option<String>,
    status_line: String,
    headers: Vec<(String, String)>,
    body: Option<Box<dyn Read + Send + Sync>>,
}

impl ReceivedResponse {
    fn new(response: Response) -> Self {
        let status = response.status();
        let reason = Some(response.status_text().to_string()).filter(|text| !text.is_empty());
        let status_line = format!(
            "{} {} {}",
            response.http_version(),
            status,
            reason.as_deref().unwrap_or_default()
        );
        // ureq lists one name per header line; pair each with its own value
        let mut seen: HashMap<String, usize> = HashMap::new();
        let headers = response
            .headers_names()
            .into_iter()
            .filter_map(|name| {
                let occurrence = seen.entry(name.clone()).or_default();
                let value = response.all(&name).get(*occurrence).map(|v| v.to_string());
                *occurrence += 1;
                value.map(|value| (name, value))
            })
            .collect();
        Self {
            status,
            reason,
            status_line: status_line.trim_end().to_string(),
            headers,
            body: Some(response.into_reader()),
        }
    }

    fn take_body(&mut self) -> Box<dyn Read> {
        match self.body.take() {
            Some(body) => body,
            None => Box::new(io::empty()),
        }
    }
}

/// Error statuses are ordinary responses here; only transport failures
/// become `io::Error`s.
fn into_response(result: Result<Response, ureq::Error>) -> io::Result<Response> {
    match result {
        Ok(response) | Err(ureq::Error::Status(_, response)) => Ok(response),
        Err(ureq::Error::Transport(transport)) => {
            let kind = match transport.kind() {
                ErrorKind::InvalidUrl | ErrorKind::UnknownScheme => io::ErrorKind::InvalidInput,
                ErrorKind::Dns => io::ErrorKind::NotFound,
                ErrorKind::ConnectionFailed => io::ErrorKind::ConnectionRefused,
                _ => io::ErrorKind::Other,
            };
            Err(io::Error::new(kind, transport))
        }
    }
}

impl UreqClient {
    pub fn new<S: Into<String>>(agent: Agent, url: S) -> Self {
        Self {
            agent,
            url: url.into(),
            connect_timeout: None,
            request_headers: Vec::new(),
            body: Vec::new(),
            connected: false,
            response: None,
        }
    }

    /// Bounds each TCP connect attempt made by `connect`.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Headers buffered for the request so far.
    pub fn request_headers(&self) -> &[(String, String)] {
        &self.request_headers
    }

    fn committed(&self) -> bool {
        self.response.is_some()
    }

    fn commit(&mut self) -> io::Result<&mut ReceivedResponse> {
        let response = match self.response.take() {
            Some(response) => response,
            None => self.send()?,
        };
        Ok(self.response.insert(response))
    }

    fn send(&mut self) -> io::Result<ReceivedResponse> {
        if !self.connected {
            self.connect()?;
        }
        let mut request = self.agent.post(&self.url);
        for (name, value) in &self.request_headers {
            request = request.set(name, value);
        }
        debug!(url = %self.url, bytes = self.body.len(), "sending request");
        let response = into_response(request.send_bytes(&self.body))?;
        let response = ReceivedResponse::new(response);
        debug!(
            status = response.status,
            reason = response.reason.as_deref().unwrap_or_default(),
            headers = response.headers.len(),
            "received response"
        );
        Ok(response)
    }

    fn reach(&self, addrs: &[SocketAddr]) -> io::Result<TcpStream> {
        let Some(timeout) = self.connect_timeout else {
            return TcpStream::connect(addrs);
        };
        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    trace!(%addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no addresses to connect to")
        }))
    }
}

impl BlockingHttpClient for UreqClient {
    fn connect(&mut self) -> io::Result<()> {
        if self.connected {
            return Ok(());
        }
        let uri: Uri = self
            .url
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let default_port = match uri.scheme_str() {
            Some("http") => 80,
            Some("https") => 443,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsupported scheme: {}", other.unwrap_or("none")),
                ))
            }
        };
        let host = uri
            .host()
            .map(|host| host.trim_start_matches('[').trim_end_matches(']'))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "url has no host"))?;
        let port = uri.port_u16().unwrap_or(default_port);
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address for {host}:{port}"),
            ));
        }
        let reachable = self.reach(&addrs)?;
        debug!(url = %self.url, peer = ?reachable.peer_addr().ok(), "endpoint reachable");
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.response = None;
        self.connected = false;
    }

    fn add_request_property(&mut self, name: &str, value: &str) -> io::Result<()> {
        if self.committed() {
            return Err(io::Error::other("already connected"));
        }
        trace!(name, value, "request header");
        self.request_headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn output_stream(&mut self) -> io::Result<Box<dyn Write + '_>> {
        if self.committed() {
            return Err(io::Error::other(
                "cannot write request body after the response has been read",
            ));
        }
        Ok(Box::new(&mut self.body))
    }

    fn response_code(&mut self) -> io::Result<u16> {
        Ok(self.commit()?.status)
    }

    fn response_message(&mut self) -> io::Result<Option<String>> {
        Ok(self.commit()?.reason.clone())
    }

    fn content_length(&mut self) -> io::Result<i64> {
        self.commit()?;
        Ok(self
            .header_field("content-length")
            .and_then(|value| value.trim().parse::<i64>().ok())
            .unwrap_or(-1))
    }

    fn input_stream(&mut self) -> io::Result<Box<dyn Read + '_>> {
        let status = self.commit()?.status;
        if status >= 400 {
            return Err(io::Error::other(format!(
                "server returned HTTP status {status} for {}",
                self.url
            )));
        }
        Ok(self.commit()?.take_body())
    }

    fn error_stream(&mut self) -> Option<Box<dyn Read + '_>> {
        let response = self.response.as_mut()?;
        if response.status < 400 {
            return None;
        }
        Some(response.take_body())
    }

    fn header_field(&self, name: &str) -> Option<String> {
        let response = self.response.as_ref()?;
        let values: Vec<&str> = response
            .headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    fn header_field_key(&self, index: usize) -> Option<&str> {
        let response = self.response.as_ref()?;
        let position = index.checked_sub(FIRST_HEADER_INDEX)?;
        response.headers.get(position).map(|(key, _)| key.as_str())
    }

    fn header_field_at(&self, index: usize) -> Option<&str> {
        let response = self.response.as_ref()?;
        match index.checked_sub(FIRST_HEADER_INDEX) {
            None => Some(response.status_line.as_str()),
            Some(position) => response.headers.get(position).map(|(_, value)| value.as_str()),
        }
    }
}
