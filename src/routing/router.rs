//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a path
//! - Return the matched route or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Exact routes are consulted before the wildcard, whatever the config order
//! - Among exact routes the first configured one wins

use url::Url;

use crate::config::schema::Route;
use crate::http::request::{parse_destination, DestinationError};
use crate::routing::matcher::{ExactPathMatcher, Matcher, WildcardMatcher};

#[derive(Debug)]
pub struct CompiledRoute {
    pub path: String,
    pub destination: Url,
    matcher: Box<dyn Matcher>,
}

impl CompiledRoute {
    fn compile(route: &Route) -> Result<Self, DestinationError> {
        let matcher: Box<dyn Matcher> = if route.is_wildcard() {
            Box::new(WildcardMatcher)
        } else {
            Box::new(ExactPathMatcher::new(route.path.clone()))
        };
        Ok(Self {
            path: route.path.clone(),
            destination: parse_destination(&route.destination)?,
            matcher,
        })
    }
}

/// Compiled routes for one server instance.
#[derive(Debug, Default)]
pub struct RouteTable {
    exact: Vec<CompiledRoute>,
    wildcard: Option<CompiledRoute>,
}

impl RouteTable {
    pub fn from_config(routes: &[Route]) -> Result<Self, DestinationError> {
        let mut table = RouteTable::default();
        for route in routes {
            let compiled = CompiledRoute::compile(route)?;
            if route.is_wildcard() {
                if table.wildcard.is_none() {
                    table.wildcard = Some(compiled);
                }
            } else {
                table.exact.push(compiled);
            }
        }
        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard.is_none()
    }

    pub fn lookup(&self, path: &str) -> Option<&CompiledRoute> {
        self.exact
            .iter()
            .find(|route| route.matcher.matches(path))
            .or_else(|| self.wildcard.as_ref().filter(|w| w.matcher.matches(path)))
    }
}
