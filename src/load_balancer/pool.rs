//! Upstream pool management.
//!
//! # Responsibilities
//! - Parse the configured upstream list once per worker
//! - Apply the round-robin algorithm to pick the first candidate
//! - Produce the failover order for one request

use url::Url;

use crate::http::request::{parse_destination, DestinationError};
use crate::load_balancer::{round_robin::RoundRobin, LoadBalancer};

/// A configured upstream server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    /// Value as written in the config.
    pub raw: String,
    pub url: Url,
}

/// The worker's private upstream rotation.
#[derive(Debug)]
pub struct UpstreamPool {
    upstreams: Vec<Upstream>,
    balancer: RoundRobin,
}

impl UpstreamPool {
    pub fn from_config(upstreams: &[String], init: Option<usize>) -> Result<Self, DestinationError> {
        let upstreams = upstreams
            .iter()
            .map(|raw| {
                Ok(Upstream {
                    raw: raw.clone(),
                    url: parse_destination(raw)?,
                })
            })
            .collect::<Result<Vec<_>, DestinationError>>()?;

        Ok(Self {
            upstreams,
            balancer: RoundRobin::starting_at(init.unwrap_or(0)),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    /// Candidates for one request: the next round-robin pick, then every other
    /// upstream once, in list order.
    pub fn failover_order(&self) -> Vec<&Upstream> {
        let Some((start, _)) = self.balancer.select(&self.upstreams) else {
            return Vec::new();
        };
        let len = self.upstreams.len();
        (0..len)
            .map(|k| &self.upstreams[(start + k) % len])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(init: Option<usize>) -> UpstreamPool {
        let list = vec![
            "http://a:1".to_string(),
            "localhost:2".to_string(),
            "https://c".to_string(),
        ];
        UpstreamPool::from_config(&list, init).unwrap()
    }

    fn raws(order: Vec<&Upstream>) -> Vec<String> {
        order.into_iter().map(|u| u.raw.clone()).collect()
    }

    #[test]
    fn each_request_starts_one_further() {
        let pool = pool(None);
        assert_eq!(raws(pool.failover_order()), ["http://a:1", "localhost:2", "https://c"]);
        assert_eq!(raws(pool.failover_order()), ["localhost:2", "https://c", "http://a:1"]);
        assert_eq!(raws(pool.failover_order()), ["https://c", "http://a:1", "localhost:2"]);
        assert_eq!(raws(pool.failover_order())[0], "http://a:1");
    }

    #[test]
    fn honors_initial_index() {
        let pool = pool(Some(2));
        assert_eq!(pool.failover_order()[0].raw, "https://c");
    }

    #[test]
    fn normalizes_localhost() {
        let pool = pool(None);
        let order = pool.failover_order();
        assert_eq!(order[1].url.as_str(), "http://localhost:2/");
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let pool = UpstreamPool::from_config(&[], None).unwrap();
        assert!(pool.is_empty());
        assert!(pool.failover_order().is_empty());
    }

    #[test]
    fn rejects_bad_upstream() {
        assert!(UpstreamPool::from_config(&["mailto:x@y".to_string()], None).is_err());
    }
}
