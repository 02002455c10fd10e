//! `WebServiceConnection` binding over a `BlockingHttpClient`.
//!
//! # Design
//! The connection owns its client as `Option<C>`; `close()` takes it out and
//! disconnects it, so "closed" and "no client" are the same state and every
//! later call fails with `TransportError::Closed`. `Drop` closes too, which
//! releases the transport on every exit path.
//!
//! Response header names come from the client's positional enumeration,
//! starting at `FIRST_HEADER_INDEX` and ending at the first missing or empty
//! key. Gzip-encoded bodies are decoded transparently.

use std::collections::HashSet;
use std::io::{self, BufRead, BufReader, Read, Write};

use flate2::bufread::GzDecoder;
use tracing::{debug, trace, warn};

use crate::client::{BlockingHttpClient, FIRST_HEADER_INDEX};
use crate::connection::{HeaderNames, HeaderValues, WebServiceConnection};
use crate::error::TransportError;
use crate::types::{is_gzip_encoding, split_header_values, StatusOutcome};

pub const HTTP_HEADER_ACCEPT_ENCODING: &str = "Accept-Encoding";
pub const HTTP_HEADER_CONTENT_ENCODING: &str = "Content-Encoding";
pub const ENCODING_GZIP: &str = "gzip";

/// One exchange over a `BlockingHttpClient`.
pub struct HttpUrlConnection<C: BlockingHttpClient> {
    client: Option<C>,
    opened: bool,
    accept_gzip_encoding: bool,
}

impl<C: BlockingHttpClient> HttpUrlConnection<C> {
    /// Wrap `client`. When `accept_gzip_encoding` is set, `open()` announces
    /// gzip support to the server.
    pub fn new(client: C, accept_gzip_encoding: bool) -> Self {
        Self {
            client: Some(client),
            opened: false,
            accept_gzip_encoding,
        }
    }

    /// The underlying client, `None` once closed.
    pub fn client(&self) -> Option<&C> {
        self.client.as_ref()
    }

    fn client_mut(&mut self) -> Result<&mut C, TransportError> {
        self.client.as_mut().ok_or(TransportError::Closed)
    }

    fn open_client(&mut self) -> Result<&mut C, TransportError> {
        let opened = self.opened;
        let client = self.client_mut()?;
        if !opened {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection is not open").into());
        }
        Ok(client)
    }
}

/// Distinct header names read positionally from a committed client.
struct PositionalHeaderNames<'a, C> {
    client: &'a C,
    index: usize,
    seen: HashSet<String>,
}

impl<C: BlockingHttpClient> Iterator for PositionalHeaderNames<'_, C> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let key = self.client.header_field_key(self.index).filter(|key| !key.is_empty())?;
            self.index += 1;
            if self.seen.insert(key.to_ascii_lowercase()) {
                return Some(key.to_string());
            }
        }
    }
}

fn empty_stream<'a>() -> Box<dyn Read + 'a> {
    Box::new(io::empty())
}

impl<C: BlockingHttpClient> WebServiceConnection for HttpUrlConnection<C> {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.opened {
            self.client_mut()?;
            return Err(io::Error::other("connection is already open").into());
        }
        let accept_gzip_encoding = self.accept_gzip_encoding;
        let client = self.client_mut()?;
        client.connect().map_err(TransportError::Open)?;
        if accept_gzip_encoding {
            client.add_request_property(HTTP_HEADER_ACCEPT_ENCODING, ENCODING_GZIP)?;
        }
        self.opened = true;
        debug!(accept_gzip_encoding, "connection opened");
        Ok(())
    }

    fn add_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        self.open_client()?.add_request_property(name, value)?;
        Ok(())
    }

    fn request_output_stream(&mut self) -> Result<Box<dyn Write + '_>, TransportError> {
        Ok(self.open_client()?.output_stream()?)
    }

    fn response_code(&mut self) -> Result<u16, TransportError> {
        Ok(self.client_mut()?.response_code()?)
    }

    fn response_content_length(&mut self) -> Result<Option<u64>, TransportError> {
        let length = self.client_mut()?.content_length()?;
        Ok(u64::try_from(length).ok())
    }

    fn response_header_names(&mut self) -> Result<HeaderNames<'_>, TransportError> {
        let client = self.client_mut()?;
        client.response_code()?;
        Ok(Box::new(PositionalHeaderNames {
            client: &*client,
            index: FIRST_HEADER_INDEX,
            seen: HashSet::new(),
        }))
    }

    fn response_headers(&mut self, name: &str) -> Result<HeaderValues, TransportError> {
        let client = self.client_mut()?;
        client.response_code()?;
        let values = client
            .header_field(name)
            .map(|raw| split_header_values(&raw))
            .unwrap_or_default();
        Ok(values.into_iter())
    }

    fn response_input_stream(&mut self) -> Result<Box<dyn Read + '_>, TransportError> {
        let client = self.client_mut()?;
        let status = client.response_code()?;
        let gzipped = client
            .header_field(HTTP_HEADER_CONTENT_ENCODING)
            .is_some_and(|value| is_gzip_encoding(&value));
        let stream = match StatusOutcome::from_code(status) {
            StatusOutcome::Fault => {
                trace!(status, "reading fault body from error stream");
                match client.error_stream() {
                    Some(stream) => stream,
                    None => empty_stream(),
                }
            }
            StatusOutcome::Success => client.input_stream()?,
            StatusOutcome::Error => {
                let message = client.response_message()?.unwrap_or_default();
                warn!(status, %message, "unsuccessful HTTP response");
                return Err(TransportError::Http { status, message });
            }
        };
        if gzipped {
            // an empty body carries no gzip header to decode
            let mut buffered = BufReader::new(stream);
            if buffered.fill_buf()?.is_empty() {
                trace!(status, "gzip response body is empty");
                return Ok(Box::new(buffered));
            }
            trace!("decoding gzip response body");
            Ok(Box::new(GzDecoder::new(buffered)))
        } else {
            Ok(stream)
        }
    }

    fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.disconnect();
            debug!("connection closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.client.is_none()
    }
}

impl<C: BlockingHttpClient> Drop for HttpUrlConnection<C> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;
    use crate::client::testing::ScriptedClient;

    fn opened(client: ScriptedClient) -> HttpUrlConnection<ScriptedClient> {
        let mut connection = HttpUrlConnection::new(client, false);
        connection.open().unwrap();
        connection
    }

    fn read_body(connection: &mut HttpUrlConnection<ScriptedClient>) -> Result<String, TransportError> {
        let mut body = String::new();
        connection.response_input_stream()?.read_to_string(&mut body)?;
        Ok(body)
    }

    #[test]
    fn success_codes_read_the_normal_stream() {
        for status in [200, 202, 204, 299] {
            let mut connection = opened(ScriptedClient::responding(status, "OK", b"<Envelope/>"));
            assert_eq!(read_body(&mut connection).unwrap(), "<Envelope/>", "{status}");
        }
    }

    #[test]
    fn internal_server_error_reads_the_fault_body() {
        let mut connection = opened(ScriptedClient::responding(500, "Internal Server Error", b"<Fault/>"));
        assert_eq!(read_body(&mut connection).unwrap(), "<Fault/>");
        assert_eq!(connection.response_outcome().unwrap(), StatusOutcome::Fault);
    }

    #[test]
    fn fault_without_error_body_reads_empty() {
        let mut connection = opened(ScriptedClient::responding(500, "Internal Server Error", b""));
        assert_eq!(read_body(&mut connection).unwrap(), "");
    }

    #[test]
    fn other_codes_fail_with_exact_code_and_reason() {
        for (status, reason) in [(404, "Not Found"), (301, "Moved Permanently"), (503, "Service Unavailable")] {
            let mut connection = opened(ScriptedClient::responding(status, reason, b"ignored"));
            let err = read_body(&mut connection).unwrap_err();
            assert!(matches!(err, TransportError::Http { status: s, ref message } if s == status && message == reason));
            assert_eq!(
                err.to_string(),
                format!("Did not receive successful HTTP response: status code = {status}, status message = [{reason}]")
            );
        }
    }

    #[test]
    fn missing_reason_phrase_renders_empty() {
        let mut client = ScriptedClient::responding(418, "", b"");
        client.reason = None;
        let mut connection = opened(client);
        let err = read_body(&mut connection).unwrap_err();
        assert!(err.to_string().ends_with("status code = 418, status message = []"));
    }

    #[test]
    fn header_names_skip_status_line_and_stop_at_first_empty_key() {
        let client = ScriptedClient::responding(200, "OK", b"")
            .with_header("Content-Type", "text/xml")
            .with_header("X-Foo", "bar")
            .with_header("", "")
            .with_header("X-After-End", "never");
        let mut connection = opened(client);
        let names: Vec<String> = connection.response_header_names().unwrap().collect();
        assert_eq!(names, vec!["Content-Type".to_string(), "X-Foo".to_string()]);
    }

    #[test]
    fn header_names_are_distinct() {
        let client = ScriptedClient::responding(200, "OK", b"")
            .with_header("Set-Cookie", "a=1")
            .with_header("Content-Length", "0")
            .with_header("set-cookie", "b=2");
        let mut connection = opened(client);
        let names: Vec<String> = connection.response_header_names().unwrap().collect();
        assert_eq!(names, vec!["Set-Cookie".to_string(), "Content-Length".to_string()]);
    }

    #[test]
    fn no_headers_yields_no_names() {
        let mut connection = opened(ScriptedClient::responding(200, "OK", b""));
        assert_eq!(connection.response_header_names().unwrap().count(), 0);
    }

    #[test]
    fn header_values_are_split_and_deduplicated() {
        let client = ScriptedClient::responding(200, "OK", b"").with_header("Accept-Encoding", "gzip, deflate, gzip");
        let mut connection = opened(client);
        let values: Vec<String> = connection.response_headers("Accept-Encoding").unwrap().collect();
        assert_eq!(values, vec!["deflate".to_string(), "gzip".to_string()]);
    }

    #[test]
    fn repeated_header_fields_merge_into_one_set() {
        let client = ScriptedClient::responding(200, "OK", b"")
            .with_header("Vary", "Accept")
            .with_header("Vary", "Accept-Encoding, Accept");
        let mut connection = opened(client);
        let values: Vec<String> = connection.response_headers("vary").unwrap().collect();
        assert_eq!(values, vec!["Accept".to_string(), "Accept-Encoding".to_string()]);
    }

    #[test]
    fn missing_header_is_empty_not_an_error() {
        let mut connection = opened(ScriptedClient::responding(200, "OK", b""));
        assert_eq!(connection.response_headers("Missing-Header").unwrap().count(), 0);
    }

    #[test]
    fn unknown_content_length_is_distinct_from_zero() {
        let mut client = ScriptedClient::responding(200, "OK", b"");
        client.content_length = -1;
        let mut connection = opened(client);
        assert_eq!(connection.response_content_length().unwrap(), None);

        let mut client = ScriptedClient::responding(200, "OK", b"");
        client.content_length = 0;
        let mut connection = opened(client);
        assert_eq!(connection.response_content_length().unwrap(), Some(0));
    }

    #[test]
    fn open_failure_is_a_transport_open_error() {
        let mut client = ScriptedClient::responding(200, "OK", b"");
        client.connect_error = Some(io::ErrorKind::ConnectionRefused);
        let mut connection = HttpUrlConnection::new(client, true);
        let err = connection.open().unwrap_err();
        assert!(matches!(err, TransportError::Open(ref e) if e.kind() == io::ErrorKind::ConnectionRefused));
    }

    #[test]
    fn open_twice_fails() {
        let mut connection = opened(ScriptedClient::responding(200, "OK", b""));
        assert!(matches!(connection.open(), Err(TransportError::Io(_))));
    }

    #[test]
    fn open_announces_gzip_when_configured() {
        let mut connection = HttpUrlConnection::new(ScriptedClient::responding(200, "OK", b""), true);
        connection.open().unwrap();
        let sent = &connection.client().unwrap().sent_headers;
        assert_eq!(sent, &vec![("Accept-Encoding".to_string(), "gzip".to_string())]);
    }

    #[test]
    fn open_stays_silent_when_gzip_is_off() {
        let connection = opened(ScriptedClient::responding(200, "OK", b""));
        assert!(connection.client().unwrap().sent_headers.is_empty());
    }

    #[test]
    fn request_headers_accumulate() {
        let mut connection = opened(ScriptedClient::responding(200, "OK", b""));
        connection.add_request_header("SOAPAction", "\"a\"").unwrap();
        connection.add_request_header("SOAPAction", "\"b\"").unwrap();
        assert_eq!(connection.client().unwrap().sent_headers.len(), 2);
    }

    #[test]
    fn header_after_commit_is_an_io_failure() {
        let mut connection = opened(ScriptedClient::responding(200, "OK", b""));
        connection.response_code().unwrap();
        let err = connection.add_request_header("X-Late", "1").unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn writing_before_open_is_rejected() {
        let mut connection = HttpUrlConnection::new(ScriptedClient::responding(200, "OK", b""), false);
        let err = connection.request_output_stream().err().unwrap();
        assert!(matches!(err, TransportError::Io(ref e) if e.kind() == io::ErrorKind::NotConnected));
    }

    #[test]
    fn body_is_written_through_the_output_stream() {
        let mut connection = opened(ScriptedClient::responding(200, "OK", b""));
        {
            let mut out = connection.request_output_stream().unwrap();
            out.write_all(b"<Envelope/>").unwrap();
            out.flush().unwrap();
        }
        assert_eq!(connection.client().unwrap().sent_body, b"<Envelope/>");
    }

    #[test]
    fn read_failures_propagate_as_io() {
        let mut client = ScriptedClient::responding(200, "OK", b"");
        client.read_error = Some(io::ErrorKind::ConnectionReset);
        let mut connection = opened(client);
        let err = connection.response_code().unwrap_err();
        assert!(matches!(err, TransportError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionReset));
    }

    #[test]
    fn gzip_encoded_body_is_decoded() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"<Envelope>compressed</Envelope>").unwrap();
        let compressed = encoder.finish().unwrap();
        let client = ScriptedClient::responding(200, "OK", &compressed).with_header("Content-Encoding", "gzip");
        let mut connection = opened(client);
        assert_eq!(read_body(&mut connection).unwrap(), "<Envelope>compressed</Envelope>");
    }

    #[test]
    fn empty_gzip_success_body_reads_empty() {
        let client = ScriptedClient::responding(204, "No Content", b"").with_header("Content-Encoding", "gzip");
        let mut connection = opened(client);
        assert_eq!(read_body(&mut connection).unwrap(), "");
    }

    #[test]
    fn empty_gzip_fault_body_reads_empty() {
        let client =
            ScriptedClient::responding(500, "Internal Server Error", b"").with_header("Content-Encoding", "gzip");
        let mut connection = opened(client);
        assert_eq!(read_body(&mut connection).unwrap(), "");
    }

    #[test]
    fn gzip_fault_body_is_decoded() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"<Fault>compressed</Fault>").unwrap();
        let compressed = encoder.finish().unwrap();
        let client = ScriptedClient::responding(500, "Internal Server Error", &compressed)
            .with_header("Content-Encoding", "gzip");
        let mut connection = opened(client);
        assert_eq!(read_body(&mut connection).unwrap(), "<Fault>compressed</Fault>");
    }

    #[test]
    fn every_operation_fails_after_close() {
        let mut connection = opened(ScriptedClient::responding(200, "OK", b""));
        connection.close();
        assert!(connection.is_closed());
        assert!(matches!(connection.open(), Err(TransportError::Closed)));
        assert!(matches!(connection.add_request_header("A", "b"), Err(TransportError::Closed)));
        assert!(matches!(connection.request_output_stream().err(), Some(TransportError::Closed)));
        assert!(matches!(connection.response_code(), Err(TransportError::Closed)));
        assert!(matches!(connection.response_content_length(), Err(TransportError::Closed)));
        assert!(matches!(connection.response_header_names().err(), Some(TransportError::Closed)));
        assert!(matches!(connection.response_headers("A"), Err(TransportError::Closed)));
        assert!(matches!(connection.response_input_stream().err(), Some(TransportError::Closed)));
    }

    #[test]
    fn close_is_idempotent_and_disconnects_once() {
        let client = ScriptedClient::responding(200, "OK", b"");
        let disconnects = client.disconnects.clone();
        let mut connection = opened(client);
        connection.close();
        connection.close();
        drop(connection);
        assert_eq!(disconnects.get(), 1);
    }

    #[test]
    fn drop_releases_the_client() {
        let client = ScriptedClient::responding(200, "OK", b"");
        let disconnects = client.disconnects.clone();
        {
            let mut connection = opened(client);
            let _ = connection.response_code();
        }
        assert_eq!(disconnects.get(), 1);
    }

    #[test]
    fn connection_is_usable_as_a_trait_object() {
        let mut connection = opened(ScriptedClient::responding(202, "Accepted", b"ok"));
        let dynamic: &mut dyn WebServiceConnection = &mut connection;
        assert_eq!(dynamic.response_code().unwrap(), 202);
    }
}
