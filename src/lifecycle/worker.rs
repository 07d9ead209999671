//! Worker process: binds every configured instance and serves it.
//!
//! # Responsibilities
//! - Read the configuration the master writes to stdin
//! - Build the per-worker cache, upstream rotation and forwarder
//! - Bind each instance (TLS material first), then report READY once
//! - Report setup and runtime failures to the master instead of dying silently
//! - Exit 0 on SIGTERM after draining briefly
//!
//! # Design Decisions
//! - A worker whose setup failed stays alive until the master's decision
//!   reaches it; the master either tears the group down or restarts the worker
//! - A panic anywhere reports `ERR_WORKER_PANIC` and exits 1; the master respawns

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinSet;

use crate::cache::ResponseCache;
use crate::config::{ProxyConfig, ServerInstance};
use crate::http::middleware::WorkerShared;
use crate::http::request::DestinationError;
use crate::http::server::{HttpServer, ServerError};
use crate::ipc::{ErrorInfo, IpcMessage, IpcSender};
use crate::lifecycle::{signals, Shutdown};
use crate::load_balancer::UpstreamPool;
use crate::net::{tls, Listener, ListenerError, TlsError, TlsMaterial};

pub const PANIC_CODE: &str = "ERR_WORKER_PANIC";

/// How long serving tasks get to wind down after SIGTERM.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to read worker configuration: {0}")]
    ConfigRead(#[from] std::io::Error),
    #[error("malformed worker configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error(transparent)]
    Destination(#[from] DestinationError),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

impl WorkerError {
    /// Wire form reported to the master.
    pub fn to_error_info(&self) -> ErrorInfo {
        match self {
            WorkerError::Tls(e) => e.to_error_info(),
            WorkerError::Listener(e) | WorkerError::Server(ServerError::Listener(e)) => e.to_error_info(),
            WorkerError::Server(ServerError::Serve { addr, source }) => ErrorInfo::from_io(source, "serve")
                .with_port(addr.port())
                .with_address(addr.ip().to_string()),
            WorkerError::ConfigRead(e) => ErrorInfo::from_io(e, "read"),
            WorkerError::ConfigParse(_) => ErrorInfo::new("ERR_WORKER_CONFIG").with_message(self.to_string()),
            WorkerError::Destination(_) | WorkerError::Server(ServerError::Destination(_)) => {
                ErrorInfo::new("ERR_INVALID_DESTINATION").with_message(self.to_string())
            }
        }
    }
}

/// Read the JSON configuration until end of input.
pub async fn read_config<R: AsyncRead + Unpin>(mut input: R) -> Result<ProxyConfig, WorkerError> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw).await?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Report panics to the master, then exit 1.
pub fn install_panic_hook(ipc: IpcSender) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        let report = IpcMessage::error(ErrorInfo::new(PANIC_CODE).with_message(info.to_string()));
        let _ = ipc.send(&report);
        std::process::exit(1);
    }));
}

/// Load TLS material, bind and build the server for one instance.
fn start_instance(
    instance: ServerInstance,
    shared: &WorkerShared,
    redirect_http: bool,
) -> Result<HttpServer, WorkerError> {
    let tls = match &instance.ssl {
        Some(ssl) => Some(tls::rustls_config(&TlsMaterial::load(ssl)?)?),
        None => None,
    };

    let listener = Listener::bind(SocketAddr::new(instance.bind, instance.port))?;
    let redirect_only = redirect_http && instance.port == 80 && tls.is_none();
    Ok(HttpServer::new(Arc::new(instance), shared, listener, tls, redirect_only)?)
}

/// Run worker `id` until SIGTERM; returns the exit code.
pub async fn run(id: u32, config: ProxyConfig, ipc: IpcSender) -> i32 {
    let report = |error: &WorkerError| {
        tracing::error!(worker = id, error = %error, "Worker error");
        if let Err(send_error) = ipc.send(&IpcMessage::error(error.to_error_info())) {
            tracing::error!(worker = id, error = %send_error, "Failed to report to master");
        }
    };

    let upstreams = match UpstreamPool::from_config(&config.upstream, config.init_upstream) {
        Ok(pool) => pool,
        Err(error) => {
            report(&error.into());
            signals::terminate().await;
            return 0;
        }
    };
    let shared = WorkerShared::new(ResponseCache::new(), upstreams);
    let redirect_http = config.redirects_http_to_https();

    let mut servers = Vec::with_capacity(config.server.instances.len());
    for instance in config.server.instances {
        match start_instance(instance, &shared, redirect_http) {
            Ok(server) => servers.push(server),
            Err(error) => {
                report(&error);
                signals::terminate().await;
                tracing::info!(worker = id, "Worker process shutting down");
                return 0;
            }
        }
    }

    let addresses: Vec<String> = servers.iter().map(|s| s.local_addr().to_string()).collect();
    let ready = IpcMessage::ready(format!("Worker {} listening on {}", id, addresses.join(", ")));
    if let Err(error) = ipc.send(&ready) {
        tracing::error!(worker = id, error = %error, "Failed to report readiness");
    }

    let shutdown = Shutdown::new();
    let mut tasks = JoinSet::new();
    for server in servers {
        let rx = shutdown.subscribe();
        tasks.spawn(async move { server.run(rx).await });
    }

    let serving = async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(error)) => report(&error.into()),
                Err(join_error) => tracing::error!(worker = id, error = %join_error, "Server task failed"),
            }
        }
        // every server stopped on its own; wait for the master's decision
        std::future::pending::<()>().await;
    };

    tokio::select! {
        _ = serving => {}
        _ = signals::terminate() => {}
    }

    tracing::info!(worker = id, "Worker process shutting down");
    shutdown.trigger();
    let drain = async { while tasks.join_next().await.is_some() {} };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!(worker = id, "Connections still open after grace period");
    }
    0
}
