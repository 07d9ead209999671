//! Response handling and transformation.
//!
//! # Responsibilities
//! - Render the built-in welcome and error pages
//! - Stamp `Server` / `X-Powered-By` on every response
//! - Strip hop-by-hop headers from upstream responses
//!
//! # Design Decisions
//! - Pages are compiled into the binary, so serving them never touches the disk
//! - Any status without its own page renders as 503

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode};

use crate::security::headers::strip_hop_by_hop;

pub const PRODUCT_NAME: &str = "Rex-Proxy";

const WELCOME_PAGE: &str = include_str!("../../static/welcome.html");
const NOT_FOUND_PAGE: &str = include_str!("../../static/404.html");
const BAD_GATEWAY_PAGE: &str = include_str!("../../static/502.html");
const UNAVAILABLE_PAGE: &str = include_str!("../../static/503.html");

/// Built-in page for a status code.
struct RexPage {
    status: StatusCode,
    file_name: &'static str,
    body: &'static str,
}

fn page_for(status: Option<StatusCode>) -> RexPage {
    match status.unwrap_or(StatusCode::OK) {
        StatusCode::OK => RexPage {
            status: StatusCode::OK,
            file_name: "welcome.html",
            body: WELCOME_PAGE,
        },
        StatusCode::NOT_FOUND => RexPage {
            status: StatusCode::NOT_FOUND,
            file_name: "404.html",
            body: NOT_FOUND_PAGE,
        },
        StatusCode::BAD_GATEWAY => RexPage {
            status: StatusCode::BAD_GATEWAY,
            file_name: "502.html",
            body: BAD_GATEWAY_PAGE,
        },
        _ => RexPage {
            status: StatusCode::SERVICE_UNAVAILABLE,
            file_name: "503.html",
            body: UNAVAILABLE_PAGE,
        },
    }
}

/// Render the page matching `status`; `None` renders the welcome page.
pub fn rex_page(status: Option<StatusCode>) -> Response<Body> {
    let page = page_for(status);
    let content_type = mime_guess::from_path(page.file_name).first_or_text_plain();

    let mut response = Response::new(Body::from(page.body));
    *response.status_mut() = page.status;
    if let Ok(value) = HeaderValue::from_str(content_type.essence_str()) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    stamp_product_headers(response.headers_mut());
    response
}

/// Plain-text response used for the redirect limit.
pub fn too_many_redirects() -> Response<Body> {
    let mut response = Response::new(Body::from("Too many redirects"));
    *response.status_mut() = StatusCode::SEE_OTHER;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
    stamp_product_headers(response.headers_mut());
    response
}

/// Overwrite `Server` and `X-Powered-By` with the product name.
pub fn stamp_product_headers(headers: &mut HeaderMap) {
    let value = HeaderValue::from_static(PRODUCT_NAME);
    headers.insert(header::SERVER, value.clone());
    headers.insert("x-powered-by", value);
}

/// Headers relayed to the client for an upstream response.
pub fn relay_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    strip_hop_by_hop(&mut headers);
    stamp_product_headers(&mut headers);
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page_is_welcome() {
        let response = rex_page(None);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(response.headers()[header::SERVER], PRODUCT_NAME);
        assert_eq!(response.headers()["x-powered-by"], PRODUCT_NAME);
    }

    #[test]
    fn unknown_status_renders_unavailable() {
        assert_eq!(rex_page(Some(StatusCode::IM_A_TEAPOT)).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(rex_page(Some(StatusCode::NOT_FOUND)).status(), StatusCode::NOT_FOUND);
        assert_eq!(rex_page(Some(StatusCode::BAD_GATEWAY)).status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn relay_overwrites_server_and_strips_connection() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::SERVER, HeaderValue::from_static("nginx"));
        upstream.insert("x-powered-by", HeaderValue::from_static("PHP/8"));
        upstream.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let relayed = relay_headers(&upstream);
        assert_eq!(relayed[header::SERVER], PRODUCT_NAME);
        assert_eq!(relayed["x-powered-by"], PRODUCT_NAME);
        assert!(relayed.get(header::CONNECTION).is_none());
        assert_eq!(relayed[header::CONTENT_TYPE], "application/json");
    }
}
