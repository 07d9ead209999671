//! Fallback stage: always answers.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Response, StatusCode};

use super::{Flow, RequestContext, Stage};
use crate::http::response::rex_page;

#[derive(Debug, Clone, Copy)]
pub struct FallbackStage;

/// Built-in page for the carried status; the welcome page when nothing was carried.
pub fn render(carried: Option<StatusCode>) -> Response<Body> {
    rex_page(carried)
}

#[async_trait]
impl Stage for FallbackStage {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Flow {
        Flow::Respond(render(ctx.carried))
    }
}
