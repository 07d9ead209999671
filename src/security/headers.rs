//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Add `Via`, `X-Forwarded-For`, `X-Forwarded-Proto`, `X-Forwarded-Host`, `X-Forwarded-Port`
//! - Point `Host` at the destination
//!
//! # Design Decisions
//! - Preserve the original client chain in X-Forwarded-For and append the peer
//! - Headers listed inside `Connection` are treated as hop-by-hop as well
//! - The inbound Host survives only as X-Forwarded-Host

use std::net::IpAddr;

use axum::http::header::{self, HeaderName};
use axum::http::{HeaderMap, HeaderValue};
use url::Url;

/// Headers meaningful only for a single transport leg.
pub const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "upgrade",
    "keep-alive",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
];

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_PORT: &str = "x-forwarded-port";

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let nominated: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in nominated {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Facts about the inbound connection needed to annotate a forwarded request.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub peer: IpAddr,
    /// Inbound Host header value.
    pub host: String,
    pub secure: bool,
    /// Port of the listener that accepted the connection.
    pub local_port: u16,
}

/// Build the outbound header set for a request going to `target`.
pub fn outbound_headers(inbound: &HeaderMap, client: &ClientInfo, target: &Url) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);

    let forwarded_for = match inbound.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(chain) if !chain.trim().is_empty() => format!("{}, {}", chain, client.peer),
        _ => client.peer.to_string(),
    };

    let mut set = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    };

    set("via", format!("1.1 {}", client.host));
    set(X_FORWARDED_FOR, forwarded_for);
    set(X_FORWARDED_HOST, client.host.clone());
    set(X_FORWARDED_PROTO, if client.secure { "https" } else { "http" }.to_string());
    set(X_FORWARDED_PORT, client.local_port.to_string());

    if let Some(authority) = target_authority(target) {
        set("host", authority);
    }
    headers
}

fn target_authority(target: &Url) -> Option<String> {
    let host = target.host_str()?;
    Some(match target.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientInfo {
        ClientInfo {
            peer: "10.0.0.7".parse().unwrap(),
            host: "shop.example.com".into(),
            secure: true,
            local_port: 443,
        }
    }

    #[test]
    fn strips_fixed_and_nominated_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close, x-session-hint"));
        headers.insert("x-session-hint", HeaderValue::from_static("abc"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::PROXY_AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::ACCEPT], "*/*");
    }

    #[test]
    fn adds_forwarding_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("shop.example.com"));
        inbound.insert(header::UPGRADE, HeaderValue::from_static("websocket"));

        let target = Url::parse("http://localhost:3000/api").unwrap();
        let headers = outbound_headers(&inbound, &client(), &target);

        assert_eq!(headers["via"], "1.1 shop.example.com");
        assert_eq!(headers[X_FORWARDED_FOR], "10.0.0.7");
        assert_eq!(headers[X_FORWARDED_HOST], "shop.example.com");
        assert_eq!(headers[X_FORWARDED_PROTO], "https");
        assert_eq!(headers[X_FORWARDED_PORT], "443");
        assert_eq!(headers[header::HOST], "localhost:3000");
        assert!(headers.get(header::UPGRADE).is_none());
    }

    #[test]
    fn appends_to_existing_forwarded_chain() {
        let mut inbound = HeaderMap::new();
        inbound.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));
        let target = Url::parse("https://api.internal").unwrap();

        let headers = outbound_headers(&inbound, &client(), &target);
        assert_eq!(headers[X_FORWARDED_FOR], "203.0.113.9, 10.0.0.7");
        assert_eq!(headers[header::HOST], "api.internal");
    }
}
