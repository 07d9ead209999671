//! Route matching logic.
//!
//! # Responsibilities
//! - Match request paths exactly (case-sensitive)
//! - Match anything for the wildcard route
//!
//! # Design Decisions
//! - Path matching is exact: `/api` does not match `/api/users`
//! - No regex in the hot path

/// Trait for matching a request path against a route condition.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the path matches this condition.
    fn matches(&self, path: &str) -> bool;
}

/// Matches one path exactly.
#[derive(Debug, Clone)]
pub struct ExactPathMatcher {
    path: String,
}

impl ExactPathMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Matcher for ExactPathMatcher {
    fn matches(&self, path: &str) -> bool {
        self.path == path
    }
}

/// Matches every path.
#[derive(Debug, Clone, Copy, Default)]
pub struct WildcardMatcher;

impl Matcher for WildcardMatcher {
    fn matches(&self, _path: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_matcher_is_exact_and_case_sensitive() {
        let matcher = ExactPathMatcher::new("/api");
        assert!(matcher.matches("/api"));
        assert!(!matcher.matches("/api/"));
        assert!(!matcher.matches("/api/users"));
        assert!(!matcher.matches("/API"));
    }

    #[test]
    fn wildcard_matches_everything() {
        assert!(WildcardMatcher.matches("/"));
        assert!(WildcardMatcher.matches("/anything/at/all"));
    }
}
