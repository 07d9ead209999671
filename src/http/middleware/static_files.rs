//! Static stage: serve files from the instance's `public` directory.
//!
//! `/` maps to `index.html`. Anything else is looked up verbatim under the
//! root after percent-decoding; a path that climbs out of the root, has no known
//! content type, or does not name a readable file carries 404 forward.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use percent_encoding::percent_decode_str;
use tokio_util::io::ReaderStream;

use super::{Flow, RequestContext, Stage};
use crate::http::body::MonitoredBody;
use crate::http::response::stamp_product_headers;

const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone, Copy)]
pub struct StaticStage;

/// Resolve a request path to a file path under `root`.
pub fn resolve_path(root: &Path, pathname: &str) -> Option<PathBuf> {
    if pathname == "/" {
        return Some(root.join(INDEX_FILE));
    }

    let decoded = percent_decode_str(pathname).decode_utf8().ok()?;
    let relative = Path::new(decoded.trim_start_matches('/'));

    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

async fn open_file(path: &Path) -> Option<(tokio::fs::File, u64)> {
    let file = tokio::fs::File::open(path).await.ok()?;
    let metadata = file.metadata().await.ok()?;
    metadata.is_file().then_some((file, metadata.len()))
}

#[async_trait]
impl Stage for StaticStage {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Flow {
        let Some(root) = ctx.instance.public.as_deref() else {
            return Flow::Next(ctx.carried);
        };

        let Some(path) = resolve_path(root, &ctx.proxy_url.pathname) else {
            tracing::warn!(path = %ctx.proxy_url.pathname, "Rejected static path outside public root");
            return Flow::Next(Some(StatusCode::NOT_FOUND));
        };

        let Some(mime) = mime_guess::from_path(&path).first() else {
            return Flow::Next(Some(StatusCode::NOT_FOUND));
        };

        let Some((file, len)) = open_file(&path).await else {
            tracing::debug!(path = %path.display(), "Static file not found");
            return Flow::Next(Some(StatusCode::NOT_FOUND));
        };

        tracing::info!(path = %path.display(), "Serving static file");

        let stream = Body::from_stream(ReaderStream::new(file));
        let body = MonitoredBody::new(stream, path.display().to_string());

        let mut response = Response::new(Body::new(body));
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(mime.essence_str()) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        stamp_product_headers(headers);
        Flow::Respond(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_maps_to_index() {
        let root = Path::new("/srv/www");
        assert_eq!(resolve_path(root, "/"), Some(root.join("index.html")));
        assert_eq!(resolve_path(root, "/css/site.css"), Some(root.join("css/site.css")));
    }

    #[test]
    fn decodes_and_rejects_traversal() {
        let root = Path::new("/srv/www");
        assert_eq!(resolve_path(root, "/my%20file.txt"), Some(root.join("my file.txt")));
        assert_eq!(resolve_path(root, "/../etc/passwd"), None);
        assert_eq!(resolve_path(root, "/a/%2e%2e/%2e%2e/secret"), None);
    }

    #[tokio::test]
    async fn directories_are_not_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.html"), "<p>hi</p>").unwrap();

        assert!(open_file(dir.path()).await.is_none());
        let (_, len) = open_file(&dir.path().join("page.html")).await.unwrap();
        assert_eq!(len, 9);
        assert!(open_file(&dir.path().join("missing.html")).await.is_none());
    }
}
