//! Upstream stage: round-robin pool with failover.
//!
//! Each request tries every upstream at most once, starting from the balancer's
//! pick. Connection-level failures move on to the next candidate; anything else
//! stops the walk with 503. When every candidate failed the request ends with 502.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Flow, RequestContext, Stage};
use crate::http::forwarder::Forwarder;
use crate::load_balancer::{run_failover, FailoverOutcome, UpstreamPool};

#[derive(Debug)]
pub struct UpstreamStage {
    pool: Arc<UpstreamPool>,
    forwarder: Forwarder,
}

impl UpstreamStage {
    pub fn new(pool: Arc<UpstreamPool>, forwarder: Forwarder) -> Self {
        Self { pool, forwarder }
    }
}

#[async_trait]
impl Stage for UpstreamStage {
    fn name(&self) -> &'static str {
        "upstream"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Flow {
        if self.pool.is_empty() {
            return Flow::Next(ctx.carried);
        }

        let candidates = self.pool.failover_order();
        let request: &RequestContext = ctx;
        let outcome = run_failover(&candidates, |upstream| {
            let forwarder = &self.forwarder;
            async move { forwarder.forward_to(request, &upstream.url).await }
        })
        .await;

        match outcome {
            FailoverOutcome::Success(response) => Flow::Respond(response),
            failed => Flow::Next(failed.failure_status()),
        }
    }
}
