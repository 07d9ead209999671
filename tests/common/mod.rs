//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, StatusCode};
use rex_proxy::cache::ResponseCache;
use rex_proxy::config::{ServerInstance, SslConfig};
use rex_proxy::http::middleware::WorkerShared;
use rex_proxy::http::HttpServer;
use rex_proxy::lifecycle::Shutdown;
use rex_proxy::load_balancer::UpstreamPool;
use rex_proxy::net::{tls, Listener, TlsMaterial};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Canned response served by a mock backend.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Request line and headers as received by a mock backend.
#[derive(Debug, Clone, Default)]
pub struct ReceivedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(ReceivedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut reader = BufReader::new(socket);
                        let mut received = ReceivedRequest::default();
                        let mut line = String::new();
                        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                            return;
                        }
                        received.request_line = line.trim_end().to_string();
                        loop {
                            line.clear();
                            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                                break;
                            }
                            let trimmed = line.trim_end();
                            if trimmed.is_empty() {
                                break;
                            }
                            if let Some((name, value)) = trimmed.split_once(':') {
                                received.headers.push((name.trim().to_string(), value.trim().to_string()));
                            }
                        }

                        let response = f(received).await;
                        let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, reason(response.status));
                        for (name, value) in &response.headers {
                            head.push_str(&format!("{}: {}\r\n", name, value));
                        }
                        head.push_str(&format!(
                            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.body.len(),
                            response.body
                        ));

                        let mut socket = reader.into_inner();
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a simple mock backend that returns a fixed body.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { MockResponse::ok(body) }).await
}

/// Backend that reads the request head, then hangs up without answering.
/// Returns the number of connections it accepted.
pub async fn start_hangup_backend() -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut reader = BufReader::new(socket);
                let mut line = String::new();
                while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
                    if line.trim_end().is_empty() {
                        break;
                    }
                    line.clear();
                }
                let _ = reader.into_inner().shutdown().await;
            });
        }
    });

    (addr, hits)
}

/// HTTPS backend on the localhost fixture certificate that answers every request
/// with a redirect to another path on itself. Returns the number of requests seen.
pub async fn start_tls_redirect_loop() -> (SocketAddr, Arc<AtomicU32>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();

    let app = axum::Router::new().fallback(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            let location = format!("https://localhost:{}/hop{}", addr.port(), n);
            (StatusCode::FOUND, [(header::LOCATION, location)])
        }
    });

    let ssl = SslConfig {
        cert: fixture("cert.pem"),
        key: fixture("key.pem"),
    };
    let tls = tls::rustls_config(&TlsMaterial::load(&ssl).unwrap()).unwrap();
    tokio::spawn(axum_server::from_tcp_rustls(listener, tls).serve(app.into_make_service()));

    (addr, hits)
}

/// An address nothing listens on.
pub fn dead_addr() -> SocketAddr {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap()
}

/// Instance on an ephemeral loopback port with everything else defaulted.
pub fn loopback_instance() -> ServerInstance {
    ServerInstance {
        port: 0,
        bind: "127.0.0.1".parse().unwrap(),
        ..ServerInstance::default()
    }
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// A running in-process proxy instance.
pub struct TestProxy {
    pub addr: SocketAddr,
    _shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn https_url(&self, path: &str) -> String {
        format!("https://{}{}", self.addr, path)
    }
}

/// Serve `instance` the way a worker does, with its own cache and rotation.
pub async fn spawn_proxy(instance: ServerInstance, upstreams: &[String]) -> TestProxy {
    let shared = WorkerShared::new(
        ResponseCache::new(),
        UpstreamPool::from_config(upstreams, None).unwrap(),
    );
    let tls = instance
        .ssl
        .as_ref()
        .map(|ssl| tls::rustls_config(&TlsMaterial::load(ssl).unwrap()).unwrap());
    let listener = Listener::bind(std::net::SocketAddr::new(instance.bind, instance.port)).unwrap();

    let server = HttpServer::new(Arc::new(instance), &shared, listener, tls, false).unwrap();
    let addr = server.local_addr();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(server.run(rx));

    TestProxy {
        addr,
        _shutdown: shutdown,
    }
}

/// Client that talks to the proxy directly and never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap()
}
