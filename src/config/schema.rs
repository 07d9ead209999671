//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits: TOML on disk, JSON on the worker's stdin.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Number of worker processes, or `"auto"` for one per CPU.
    pub workers: WorkerCount,

    /// Listener instances.
    pub server: ServerConfig,

    /// Upstream pool used for round-robin forwarding.
    pub upstream: Vec<String>,

    /// Index of the first upstream a worker tries.
    pub init_upstream: Option<usize>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// True when both a plain port-80 listener and a port-443 listener are configured.
    pub fn redirects_http_to_https(&self) -> bool {
        let has = |port| self.server.instances.iter().any(|i| i.port == port);
        has(80) && has(443)
    }
}

/// Worker process count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WorkerCount {
    Fixed(usize),
    Keyword(WorkerKeyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKeyword {
    Auto,
}

impl WorkerCount {
    /// Resolve to a concrete number of workers.
    pub fn resolve(&self) -> usize {
        match self {
            WorkerCount::Fixed(n) => (*n).max(1),
            WorkerCount::Keyword(WorkerKeyword::Auto) => num_cpus::get().max(1),
        }
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        WorkerCount::Keyword(WorkerKeyword::Auto)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub instances: Vec<ServerInstance>,
}

/// A single listener and the pipeline settings bound to it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerInstance {
    /// Port to listen on.
    pub port: u16,

    /// Interface to bind.
    pub bind: IpAddr,

    /// TLS material; its presence makes this an HTTPS listener.
    pub ssl: Option<SslConfig>,

    /// Directory served by the static stage.
    pub public: Option<PathBuf>,

    /// Path-mapped destinations.
    pub routes: Vec<Route>,

    /// Response cache policy.
    pub caching: CachingMode,
}

impl ServerInstance {
    pub fn is_https(&self) -> bool {
        self.ssl.is_some()
    }
}

impl Default for ServerInstance {
    fn default() -> Self {
        Self {
            port: 80,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ssl: None,
            public: None,
            routes: Vec::new(),
            caching: CachingMode::default(),
        }
    }
}

/// Certificate and key paths (PEM).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SslConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Literal path that matches any request no other route claimed.
pub const WILDCARD_PATH: &str = "/*";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Route {
    pub path: String,
    pub destination: String,
}

impl Route {
    pub fn is_wildcard(&self) -> bool {
        self.path == WILDCARD_PATH
    }
}

/// How an instance interacts with the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CachingMode {
    #[default]
    Disabled,
    /// Follow the upstream `Cache-Control` directive.
    Respect,
    /// Cache every eligible response for the default TTL.
    Override,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
