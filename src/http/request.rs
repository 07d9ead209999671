//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID for tracing
//! - Extract the routing-relevant view of a request (`ProxyUrl`)
//! - Normalize configured destinations into absolute URLs
//! - Build the outbound target from a destination and the inbound path
//!
//! # Design Decisions
//! - `ProxyUrl` is built once per request and shared by every stage
//! - The raw URL string is kept verbatim; it is the cache key
//! - Destinations without a scheme that start with `localhost` are treated as plain HTTP

use axum::http::uri::Authority;
use axum::http::{header, HeaderMap, HeaderValue, Request, Uri};
use thiserror::Error;
use tower_http::request_id::{MakeRequestId, RequestId};
use url::Url;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Request ID generator for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRexRequestId;

impl MakeRequestId for MakeRexRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Parsed view of an inbound request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyUrl {
    /// `http` or `https`, from the listener that accepted the request.
    pub scheme: &'static str,
    /// Host header value, port included when the client sent one.
    pub host: String,
    /// Host without port.
    pub hostname: String,
    pub pathname: String,
    pub query: Option<String>,
    /// `{scheme}://{host}{path}{?query}` exactly as received.
    pub url_string: String,
}

impl ProxyUrl {
    pub fn from_request_parts(uri: &Uri, headers: &HeaderMap, secure: bool) -> Self {
        let scheme = if secure { "https" } else { "http" };
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".to_string());

        let hostname = host
            .parse::<Authority>()
            .map(|a| a.host().to_string())
            .unwrap_or_else(|_| host.clone());

        let pathname = uri.path().to_string();
        let query = uri.query().map(str::to_string);
        let url_string = format!("{}://{}{}", scheme, host, path_and_query(uri));

        Self {
            scheme,
            host,
            hostname,
            pathname,
            query,
            url_string,
        }
    }

    /// Path plus `?query` when present.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.pathname, q),
            None => self.pathname.clone(),
        }
    }
}

fn path_and_query(uri: &Uri) -> &str {
    uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DestinationError {
    #[error("invalid destination url: {0}")]
    Parse(#[from] url::ParseError),
    #[error("unsupported scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("destination has no host")]
    MissingHost,
}

/// Parse a configured route destination or upstream into an absolute URL.
pub fn parse_destination(raw: &str) -> Result<Url, DestinationError> {
    let candidate = if raw.starts_with("localhost") {
        format!("http://{}", raw)
    } else {
        raw.to_string()
    };

    let url = Url::parse(&candidate)?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(DestinationError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().is_none() {
        return Err(DestinationError::MissingHost);
    }
    Ok(url)
}

/// Join a destination base with the inbound path and query.
pub fn build_target(base: &Url, path_and_query: &str) -> Result<Url, DestinationError> {
    let base = base.as_str().trim_end_matches('/');
    let joined = format!("{}{}", base, path_and_query);
    Ok(Url::parse(&joined)?)
}
