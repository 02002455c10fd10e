use std::io::Write;

use axum::{
    body::Bytes,
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    routing::post,
    Router,
};
use flate2::{write::GzEncoder, Compression};
use tokio::net::TcpListener;
use tracing::{error, info};

pub const FAULT_ENVELOPE: &str = concat!(
    r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">"#,
    "<soapenv:Body><soapenv:Fault>",
    "<faultcode>soapenv:Server</faultcode><faultstring>Invalid stock symbol</faultstring>",
    "</soapenv:Fault></soapenv:Body></soapenv:Envelope>"
);

pub const GZIP_ENVELOPE: &str = concat!(
    r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">"#,
    "<soapenv:Body><Quote>42.17</Quote></soapenv:Body></soapenv:Envelope>"
);

const TEXT_XML: &str = "text/xml; charset=utf-8";

pub fn app() -> Router {
    Router::new()
        .route("/echo", post(echo))
        .route("/fault", post(fault))
        .route("/gzip", post(gzip))
        .route("/headers", post(headers))
        .route("/moved", post(moved))
        .route("/unavailable", post(unavailable))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    info!(addr = ?listener.local_addr().ok(), "mock endpoint listening");
    axum::serve(listener, app()).await
}

fn request_header(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("none")
        .to_string()
}

/// Returns the request body and reflects the headers a client sent.
async fn echo(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let accept_encoding = request_header(&headers, header::ACCEPT_ENCODING);
    let soap_action = request_header(&headers, header::HeaderName::from_static("soapaction"));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, TEXT_XML.to_string()),
            (header::HeaderName::from_static("x-received-accept-encoding"), accept_encoding),
            (header::HeaderName::from_static("x-received-soapaction"), soap_action),
        ],
        body,
    )
}

async fn fault() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, TEXT_XML)],
        FAULT_ENVELOPE,
    )
}

async fn gzip() -> Result<impl IntoResponse, StatusCode> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let compressed = encoder
        .write_all(GZIP_ENVELOPE.as_bytes())
        .and_then(|_| encoder.finish())
        .map_err(|e| {
            error!(cause = %e, "gzip encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, TEXT_XML), (header::CONTENT_ENCODING, "gzip")],
        compressed,
    ))
}

/// Repeated and comma-separated header values.
async fn headers() -> impl IntoResponse {
    (
        StatusCode::OK,
        AppendHeaders([
            (header::VARY, "Accept, Accept-Encoding"),
            (header::VARY, "Accept"),
            (header::HeaderName::from_static("x-tag"), "alpha, beta, alpha"),
        ]),
        "",
    )
}

async fn moved() -> impl IntoResponse {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/echo")])
}

async fn unavailable() -> impl IntoResponse {
    (StatusCode::SERVICE_UNAVAILABLE, "try again later")
}
