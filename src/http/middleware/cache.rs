//! Cache stage: replay a stored response when one is live.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Response, StatusCode};

use super::{Flow, RequestContext, Stage};
use crate::cache::{caching_permitted, ResponseCache};

#[derive(Debug, Clone)]
pub struct CacheStage {
    cache: ResponseCache,
}

impl CacheStage {
    pub fn new(cache: ResponseCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Stage for CacheStage {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Flow {
        if !caching_permitted(ctx.instance.caching) || ctx.method != Method::GET {
            return Flow::Next(None);
        }

        match self.cache.get(&ctx.proxy_url.url_string) {
            Some(entry) => {
                tracing::debug!(key = %ctx.proxy_url.url_string, "Cache hit");
                let mut response = Response::new(Body::from(entry.body));
                *response.status_mut() = StatusCode::OK;
                *response.headers_mut() = entry.headers;
                Flow::Respond(response)
            }
            None => Flow::Next(None),
        }
    }
}
