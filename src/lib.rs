//! Rex-Proxy: multi-process HTTP/HTTPS reverse proxy library

pub mod cache;
pub mod config;
pub mod http;
pub mod ipc;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
