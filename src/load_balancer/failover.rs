//! Per-request failover across the upstream pool.

use std::future::Future;

use axum::http::StatusCode;

use crate::load_balancer::pool::Upstream;

/// Errors that may be retried against another upstream.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug)]
pub enum FailoverOutcome<T, E> {
    /// An upstream answered.
    Success(T),
    /// Every candidate failed with a retryable error.
    Exhausted { attempts: usize },
    /// A non-retryable error stopped the loop.
    Aborted { attempts: usize, error: E },
}

impl<T, E> FailoverOutcome<T, E> {
    /// Status served to the client when no upstream answered.
    pub fn failure_status(&self) -> Option<StatusCode> {
        match self {
            FailoverOutcome::Success(_) => None,
            FailoverOutcome::Exhausted { .. } => Some(StatusCode::BAD_GATEWAY),
            FailoverOutcome::Aborted { .. } => Some(StatusCode::SERVICE_UNAVAILABLE),
        }
    }
}

/// Try each candidate once, in order, until one succeeds.
pub async fn run_failover<'a, T, E, F, Fut>(candidates: &[&'a Upstream], mut attempt: F) -> FailoverOutcome<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(&'a Upstream) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;
    for upstream in candidates.iter().copied() {
        attempts += 1;
        match attempt(upstream).await {
            Ok(value) => return FailoverOutcome::Success(value),
            Err(error) if error.is_retryable() => {
                tracing::warn!(
                    upstream = %upstream.raw,
                    attempt = attempts,
                    error = %error,
                    "Upstream unreachable, failing over"
                );
            }
            Err(error) => {
                tracing::error!(upstream = %upstream.raw, error = %error, "Upstream request failed");
                return FailoverOutcome::Aborted { attempts, error };
            }
        }
    }
    FailoverOutcome::Exhausted { attempts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::pool::UpstreamPool;
    use std::cell::RefCell;

    #[derive(Debug)]
    struct FakeError(bool);

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fake retryable={}", self.0)
        }
    }

    fn pool(n: usize) -> UpstreamPool {
        let list: Vec<String> = (0..n).map(|i| format!("http://u{}:80", i)).collect();
        UpstreamPool::from_config(&list, None).unwrap()
    }

    #[tokio::test]
    async fn all_unreachable_tries_each_exactly_once() {
        let pool = pool(4);
        let order = pool.failover_order();
        let tried = RefCell::new(Vec::new());

        let outcome: FailoverOutcome<(), FakeError> = run_failover(&order, |u| {
            tried.borrow_mut().push(u.raw.clone());
            async { Err(FakeError(true)) }
        })
        .await;

        assert!(matches!(outcome, FailoverOutcome::Exhausted { attempts: 4 }));
        assert_eq!(outcome.failure_status(), Some(StatusCode::BAD_GATEWAY));
        let mut tried = tried.into_inner();
        tried.sort();
        tried.dedup();
        assert_eq!(tried.len(), 4);
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let pool = pool(3);
        let order = pool.failover_order();
        let calls = RefCell::new(0);

        let outcome = run_failover(&order, |u| {
            *calls.borrow_mut() += 1;
            let ok = u.raw == "http://u1:80";
            async move { if ok { Ok(u.raw.clone()) } else { Err(FakeError(true)) } }
        })
        .await;

        match outcome {
            FailoverOutcome::Success(raw) => assert_eq!(raw, "http://u1:80"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(*calls.borrow(), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_aborts_with_503() {
        let pool = pool(3);
        let order = pool.failover_order();
        let outcome: FailoverOutcome<(), FakeError> =
            run_failover(&order, |_| async { Err(FakeError(false)) }).await;

        assert!(matches!(outcome, FailoverOutcome::Aborted { attempts: 1, .. }));
        assert_eq!(outcome.failure_status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }
}
