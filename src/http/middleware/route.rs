//! Route stage: forward to the destination mapped for the request path.
//!
//! A matched route owns the request. If forwarding fails the stage answers with
//! the 502/503 page itself, so the upstream pool never sees the request.

use async_trait::async_trait;
use axum::http::StatusCode;

use super::fallback::render;
use super::{Flow, RequestContext, Stage};
use crate::http::forwarder::Forwarder;
use crate::routing::RouteTable;

#[derive(Debug)]
pub struct RouteStage {
    table: RouteTable,
    forwarder: Forwarder,
}

impl RouteStage {
    pub fn new(table: RouteTable, forwarder: Forwarder) -> Self {
        Self { table, forwarder }
    }
}

#[async_trait]
impl Stage for RouteStage {
    fn name(&self) -> &'static str {
        "route"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Flow {
        if self.table.is_empty() {
            return Flow::Next(ctx.carried);
        }

        let Some(route) = self.table.lookup(&ctx.proxy_url.pathname) else {
            return Flow::Next(Some(StatusCode::NOT_FOUND));
        };

        tracing::debug!(path = %route.path, destination = %route.destination, "Route matched");

        match self.forwarder.forward_or_status(ctx, &route.destination).await {
            Ok(response) => Flow::Respond(response),
            Err(status) => Flow::Respond(render(Some(status))),
        }
    }
}
