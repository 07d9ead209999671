//! HTTP server setup for one configured instance.
//!
//! # Responsibilities
//! - Create the Axum router that hands every request to the pipeline
//! - Wire up the ambient layers (trace span, request ID)
//! - Serve plain HTTP through `axum::serve` and HTTPS through `axum-server`
//! - Stop accepting and drain when the worker's shutdown signal fires
//!
//! # Design Decisions
//! - No path routing at the Axum level: a single fallback handler sees everything
//! - A port-80 instance alongside a port-443 instance only redirects
//! - The listener is bound before the server is built, so the forwarded port
//!   is the one actually accepted on

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, Response},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ServerInstance;
use crate::http::middleware::https_redirect::redirect_to_https;
use crate::http::middleware::{Pipeline, RequestContext, WorkerShared};
use crate::http::request::{DestinationError, MakeRexRequestId};
use crate::net::{Listener, ListenerError};

/// Time in-flight TLS connections get to finish once shutdown starts.
const TLS_DRAIN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid route destination: {0}")]
    Destination(#[from] DestinationError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("server error on {addr}: {source}")]
    Serve {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub instance: Arc<ServerInstance>,
    pub pipeline: Arc<Pipeline>,
    pub local_port: u16,
}

/// HTTP server for one configured instance.
pub struct HttpServer {
    router: Router,
    listener: Listener,
    tls: Option<RustlsConfig>,
}

impl HttpServer {
    /// Build the server for `instance` on an already bound `listener`.
    pub fn new(
        instance: Arc<ServerInstance>,
        shared: &WorkerShared,
        listener: Listener,
        tls: Option<RustlsConfig>,
        redirect_only: bool,
    ) -> Result<Self, ServerError> {
        let router = if redirect_only {
            Self::redirect_router()
        } else {
            let state = AppState {
                pipeline: Arc::new(Pipeline::new(&instance, shared)?),
                local_port: listener.local_addr().port(),
                instance,
            };
            Self::build_router(state)
        };
        Ok(Self { router, listener, tls })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new().fallback(dispatch).with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRexRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    fn redirect_router() -> Router {
        Router::new()
            .fallback(redirect_to_https)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        let addr = self.listener.local_addr();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let serve_err = |source| ServerError::Serve { addr, source };

        match self.tls {
            None => {
                tracing::info!(address = %addr, "HTTP server starting");
                axum::serve(self.listener.into_tokio(), app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown.recv().await;
                    })
                    .await
                    .map_err(serve_err)?;
            }
            Some(tls) => {
                tracing::info!(address = %addr, "HTTPS server starting");
                let handle = axum_server::Handle::new();
                let drain = handle.clone();
                tokio::spawn(async move {
                    let _ = shutdown.recv().await;
                    drain.graceful_shutdown(Some(TLS_DRAIN_GRACE));
                });

                axum_server::from_tcp_rustls(self.listener.into_std()?, tls)
                    .handle(handle)
                    .serve(app)
                    .await
                    .map_err(serve_err)?;
            }
        }

        tracing::info!(address = %addr, "Server stopped");
        Ok(())
    }
}

/// Every request on a proxying instance lands here.
async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let ctx = RequestContext::new(request, peer, state.instance.clone(), state.local_port);
    state.pipeline.run(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseCache;
    use crate::config::CachingMode;
    use crate::load_balancer::UpstreamPool;
    use axum::http::StatusCode;

    fn instance(public: Option<std::path::PathBuf>) -> ServerInstance {
        ServerInstance {
            port: 0,
            bind: "127.0.0.1".parse().unwrap(),
            ssl: None,
            public,
            routes: Vec::new(),
            caching: CachingMode::Disabled,
        }
    }

    async fn spawn(instance: ServerInstance, redirect_only: bool) -> (SocketAddr, crate::lifecycle::Shutdown) {
        let shared = WorkerShared::new(ResponseCache::new(), UpstreamPool::from_config(&[], None).unwrap());
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let server = HttpServer::new(Arc::new(instance), &shared, listener, None, redirect_only).unwrap();
        let addr = server.local_addr();
        let shutdown = crate::lifecycle::Shutdown::new();
        let rx = shutdown.subscribe();
        tokio::spawn(server.run(rx));
        (addr, shutdown)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn bare_instance_serves_welcome_page() {
        let (addr, _shutdown) = spawn(instance(None), false).await;

        let res = client().get(format!("http://{}/", addr)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["server"], "Rex-Proxy");
        assert!(res.headers().contains_key("x-request-id"));
        assert!(res.text().await.unwrap().contains("Welcome"));
    }

    #[tokio::test]
    async fn missing_static_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        let (addr, _shutdown) = spawn(instance(Some(dir.path().to_path_buf())), false).await;

        let home = client().get(format!("http://{}/", addr)).send().await.unwrap();
        assert_eq!(home.status(), StatusCode::OK);
        assert_eq!(home.headers()["content-type"], "text/html");
        assert_eq!(home.text().await.unwrap(), "<h1>home</h1>");

        let missing = client().get(format!("http://{}/nope.css", addr)).send().await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn redirect_only_server_sends_301() {
        let (addr, _shutdown) = spawn(instance(None), true).await;

        let res = client()
            .get(format!("http://{}/a?b=c", addr))
            .header("host", "example.com")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.headers()["location"], "https://example.com/a?b=c");
    }
}
