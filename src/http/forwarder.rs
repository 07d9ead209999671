//! Outbound request forwarding.
//!
//! # Responsibilities
//! - Build the outbound request (target URL, rewritten headers, streamed body)
//! - Pick the plain or TLS client from the target scheme
//! - Follow HTTPS `Location` redirects internally, at most [`MAX_REDIRECTS`] times
//! - Classify transport failures into retryable and fatal kinds
//! - Relay the upstream response and arm cache population
//!
//! # Design Decisions
//! - Redirects are a bounded loop, so the limit is a plain counter check
//! - The request body is never buffered; see `BodySlot`
//! - No per-request timeout: only connecting is bounded

use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode, Uri, Version};
use hyper::body::Incoming;
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use url::Url;

use crate::cache::{cache_ttl, caching_permitted, is_cacheable_exchange, ResponseCache};
use crate::http::body::{CacheCapture, MonitoredBody, ReplayBody};
use crate::http::middleware::RequestContext;
use crate::http::request::{build_target, DestinationError};
use crate::http::response::{relay_headers, too_many_redirects};
use crate::load_balancer::Retryable;
use crate::security::headers::outbound_headers;

pub const MAX_REDIRECTS: usize = 5;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport failure kinds, named after the errno they correspond to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCode {
    ConnRefused,
    TimedOut,
    NotFound,
    Other,
}

impl TransportCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportCode::ConnRefused => "ECONNREFUSED",
            TransportCode::TimedOut => "ETIMEDOUT",
            TransportCode::NotFound => "ENOTFOUND",
            TransportCode::Other => "EPROTO",
        }
    }
}

impl std::fmt::Display for TransportCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error(transparent)]
    Target(#[from] DestinationError),
    #[error("invalid outbound request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("{code} forwarding to {target}: {source}")]
    Transport {
        code: TransportCode,
        target: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },
}

impl ForwardError {
    pub fn transport_code(&self) -> TransportCode {
        match self {
            ForwardError::Transport { code, .. } => *code,
            _ => TransportCode::Other,
        }
    }

    /// Status served when nobody else handles the error.
    pub fn default_status(&self) -> StatusCode {
        if self.is_retryable() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl Retryable for ForwardError {
    fn is_retryable(&self) -> bool {
        !matches!(self.transport_code(), TransportCode::Other)
    }
}

/// Walk the error chain for the underlying cause.
pub fn classify_transport(error: &(dyn StdError + 'static)) -> TransportCode {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return TransportCode::ConnRefused,
                std::io::ErrorKind::TimedOut => return TransportCode::TimedOut,
                _ => {}
            }
        }
        let text = err.to_string();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return TransportCode::NotFound;
        }
        current = err.source();
    }
    TransportCode::Other
}

/// Proxy forwarder shared by the route and upstream stages of one worker.
#[derive(Debug, Clone)]
pub struct Forwarder {
    http: Client<HttpConnector, ReplayBody>,
    https: Client<HttpsConnector<HttpConnector>, ReplayBody>,
    cache: ResponseCache,
}

impl Forwarder {
    pub fn new(cache: ResponseCache) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(CONNECT_TIMEOUT));

        let mut tls_inner = HttpConnector::new();
        tls_inner.enforce_http(false);
        tls_inner.set_connect_timeout(Some(CONNECT_TIMEOUT));

        Self {
            http: Client::builder(TokioExecutor::new()).build(connector),
            https: Client::builder(TokioExecutor::new()).build(HttpsConnector::new_with_connector(tls_inner)),
            cache,
        }
    }

    /// Forward to `destination` joined with the inbound path, applying the
    /// default error policy: retryable failures become 502, others 503.
    pub async fn forward_or_status(&self, ctx: &RequestContext, destination: &Url) -> Result<Response<Body>, StatusCode> {
        match self.forward_to(ctx, destination).await {
            Ok(response) => Ok(response),
            Err(error) => {
                tracing::error!(destination = %destination, error = %error, "Forwarding failed");
                Err(error.default_status())
            }
        }
    }

    /// Forward to `destination` joined with the inbound path and query.
    pub async fn forward_to(&self, ctx: &RequestContext, destination: &Url) -> Result<Response<Body>, ForwardError> {
        let target = build_target(destination, &ctx.proxy_url.path_and_query())?;
        self.forward(ctx, target, 0).await
    }

    /// Send `ctx` to `target`, following HTTPS redirects from `redirect_count` on.
    pub async fn forward(
        &self,
        ctx: &RequestContext,
        target: Url,
        redirect_count: usize,
    ) -> Result<Response<Body>, ForwardError> {
        let hop = follow_redirects(target, redirect_count, |next| async move {
            let response = self.send(ctx, &next).await?;
            Ok::<_, ForwardError>((next, response))
        })
        .await?;

        match hop {
            Hop::Final(target, response) => Ok(self.relay(ctx, &target, response)),
            Hop::TooMany => Ok(too_many_redirects()),
        }
    }

    async fn send(&self, ctx: &RequestContext, target: &Url) -> Result<Response<Incoming>, ForwardError> {
        let mut request = Request::new(ctx.body.replay());
        *request.method_mut() = ctx.method.clone();
        *request.uri_mut() = target.as_str().parse::<Uri>().map_err(axum::http::Error::from)?;
        *request.version_mut() = Version::HTTP_11;
        *request.headers_mut() = outbound_headers(&ctx.headers, &ctx.client, target);

        tracing::debug!(method = %ctx.method, target = %target, "Forwarding request");

        let result = if target.scheme() == "https" {
            self.https.request(request).await
        } else {
            self.http.request(request).await
        };

        result.map_err(|source| ForwardError::Transport {
            code: classify_transport(&source),
            target: target.to_string(),
            source,
        })
    }

    fn relay(&self, ctx: &RequestContext, target: &Url, response: Response<Incoming>) -> Response<Body> {
        let (parts, incoming) = response.into_parts();
        let headers = relay_headers(&parts.headers);

        let mode = ctx.instance.caching;
        let capture = if caching_permitted(mode) && is_cacheable_exchange(&ctx.method, parts.status) {
            cache_ttl(mode, &parts.headers).map(|ttl| {
                CacheCapture::new(
                    self.cache.clone(),
                    ctx.proxy_url.url_string.clone(),
                    headers.clone(),
                    ttl,
                )
            })
        } else {
            None
        };

        let body = MonitoredBody::new(incoming, target.to_string()).with_capture(capture);
        let mut relayed = Response::new(Body::new(body));
        *relayed.status_mut() = parts.status;
        *relayed.headers_mut() = headers;
        relayed
    }
}

/// Where a redirect chain ended.
#[derive(Debug)]
pub enum Hop<B> {
    Final(Url, Response<B>),
    TooMany,
}

/// Bounded redirect loop: sends to `target`, then to each HTTPS `Location`,
/// giving up once more than [`MAX_REDIRECTS`] redirects were followed.
pub async fn follow_redirects<B, F, Fut>(
    mut target: Url,
    mut redirect_count: usize,
    mut send: F,
) -> Result<Hop<B>, ForwardError>
where
    F: FnMut(Url) -> Fut,
    Fut: Future<Output = Result<(Url, Response<B>), ForwardError>>,
{
    loop {
        if redirect_count > MAX_REDIRECTS {
            tracing::warn!(target = %target, redirects = redirect_count, "Too many redirects");
            return Ok(Hop::TooMany);
        }

        let (sent_to, response) = send(target).await?;

        match https_location(&response) {
            Some(location) => {
                tracing::debug!(from = %sent_to, to = %location, "Following upstream redirect");
                target = location;
                redirect_count += 1;
            }
            None => return Ok(Hop::Final(sent_to, response)),
        }
    }
}

/// Absolute HTTPS redirect target carried by `response`, if any.
fn https_location<B>(response: &Response<B>) -> Option<Url> {
    let location = response.headers().get(header::LOCATION)?.to_str().ok()?;
    Url::parse(location).ok().filter(|url| url.scheme() == "https")
}
