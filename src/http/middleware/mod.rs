//! Request-dispatch pipeline.
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → cache.rs         hit: replay stored response
//!     → static_files.rs  file under `public`: stream it
//!     → route.rs         path-mapped destination: forward
//!     → upstream.rs      round-robin pool with failover: forward
//!     → fallback.rs      render the carried status (welcome page when none)
//! ```
//!
//! # Design Decisions
//! - Stage order is fixed; there is no plugin registration
//! - A stage either answers or advances with an optional carried status;
//!   nothing is thrown across stage boundaries
//! - Exactly one stage produces the response
//! - Cache and upstream rotation are per-worker values handed in at construction

pub mod cache;
pub mod fallback;
pub mod https_redirect;
pub mod route;
pub mod static_files;
pub mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, Response, StatusCode};

use crate::cache::ResponseCache;
use crate::config::ServerInstance;
use crate::http::body::BodySlot;
use crate::http::forwarder::Forwarder;
use crate::http::request::{DestinationError, ProxyUrl};
use crate::load_balancer::UpstreamPool;
use crate::routing::RouteTable;
use crate::security::headers::ClientInfo;

/// Per-request state threaded through every stage.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub headers: HeaderMap,
    pub proxy_url: ProxyUrl,
    pub client: ClientInfo,
    pub instance: Arc<ServerInstance>,
    pub body: BodySlot,
    /// Status carried forward by the previous stage.
    pub carried: Option<StatusCode>,
}

impl RequestContext {
    pub fn new(request: Request<Body>, peer: SocketAddr, instance: Arc<ServerInstance>, local_port: u16) -> Self {
        let (parts, body) = request.into_parts();
        let secure = instance.is_https();
        let proxy_url = ProxyUrl::from_request_parts(&parts.uri, &parts.headers, secure);
        let client = ClientInfo {
            peer: peer.ip(),
            host: proxy_url.host.clone(),
            secure,
            local_port,
        };
        Self {
            method: parts.method,
            headers: parts.headers,
            proxy_url,
            client,
            instance,
            body: BodySlot::new(body),
            carried: None,
        }
    }
}

/// Outcome of one stage.
#[derive(Debug)]
pub enum Flow {
    Respond(Response<Body>),
    Next(Option<StatusCode>),
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &mut RequestContext) -> Flow;
}

/// Per-worker collaborators shared by every instance's pipeline.
#[derive(Debug, Clone)]
pub struct WorkerShared {
    pub cache: ResponseCache,
    pub upstreams: Arc<UpstreamPool>,
    pub forwarder: Forwarder,
}

impl WorkerShared {
    pub fn new(cache: ResponseCache, upstreams: UpstreamPool) -> Self {
        Self {
            forwarder: Forwarder::new(cache.clone()),
            cache,
            upstreams: Arc::new(upstreams),
        }
    }
}

/// The fixed Cache → Static → Route → Upstream → Fallback chain for one instance.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(instance: &ServerInstance, shared: &WorkerShared) -> Result<Self, DestinationError> {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(cache::CacheStage::new(shared.cache.clone())),
            Box::new(static_files::StaticStage),
            Box::new(route::RouteStage::new(
                RouteTable::from_config(&instance.routes)?,
                shared.forwarder.clone(),
            )),
            Box::new(upstream::UpstreamStage::new(
                shared.upstreams.clone(),
                shared.forwarder.clone(),
            )),
            Box::new(fallback::FallbackStage),
        ];
        Ok(Self { stages })
    }

    pub async fn run(&self, mut ctx: RequestContext) -> Response<Body> {
        for stage in &self.stages {
            match stage.handle(&mut ctx).await {
                Flow::Respond(response) => {
                    tracing::debug!(
                        stage = stage.name(),
                        status = %response.status(),
                        url = %ctx.proxy_url.url_string,
                        "Request answered"
                    );
                    return response;
                }
                Flow::Next(carried) => ctx.carried = carried,
            }
        }
        fallback::render(ctx.carried)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("Pipeline").field("stages", &names).finish()
    }
}
