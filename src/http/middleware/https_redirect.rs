//! Plain-HTTP to HTTPS redirect.
//!
//! Mounted on the port-80 listener only when a port-443 instance exists. Every
//! request is answered with `301` to the same host (port dropped) and path.

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, Response, StatusCode},
    response::IntoResponse,
};

use crate::http::request::ProxyUrl;
use crate::http::response::stamp_product_headers;

/// `https://{hostname}{path}{?query}` for the request.
pub fn https_location(request: &Request<Body>) -> String {
    let url = ProxyUrl::from_request_parts(request.uri(), request.headers(), false);
    format!("https://{}{}", url.hostname, url.path_and_query())
}

pub async fn redirect_to_https(request: Request<Body>) -> impl IntoResponse {
    let location = https_location(&request);
    tracing::debug!(location = %location, "Redirecting to HTTPS");

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            response.headers_mut().insert(header::LOCATION, value);
        }
        Err(_) => *response.status_mut() = StatusCode::BAD_REQUEST,
    }
    stamp_product_headers(response.headers_mut());
    response
}
