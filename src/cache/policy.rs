//! Caching permission and TTL derivation.
//!
//! `RESPECT` caches only responses whose `Cache-Control` carries `public`.
//! `no-store`, `no-cache` and `private` win over `public` when both appear.

use std::time::Duration;

use axum::http::{header, HeaderMap, Method, StatusCode};

use crate::config::CachingMode;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

pub fn caching_permitted(mode: CachingMode) -> bool {
    mode != CachingMode::Disabled
}

/// Only complete `GET 200` exchanges are stored.
pub fn is_cacheable_exchange(method: &Method, status: StatusCode) -> bool {
    method == Method::GET && status == StatusCode::OK
}

/// TTL for an upstream response, or `None` when it must not be cached.
pub fn cache_ttl(mode: CachingMode, headers: &HeaderMap) -> Option<Duration> {
    match mode {
        CachingMode::Disabled => None,
        CachingMode::Override => Some(DEFAULT_TTL),
        CachingMode::Respect => {
            let value = headers.get(header::CACHE_CONTROL)?.to_str().ok()?;
            respect_ttl(&CacheControl::parse(value))
        }
    }
}

fn respect_ttl(cc: &CacheControl) -> Option<Duration> {
    if cc.no_store || cc.no_cache || cc.private || !cc.public {
        return None;
    }
    match cc.s_maxage.or(cc.max_age) {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => Some(DEFAULT_TTL),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub public: bool,
    pub private: bool,
    pub no_store: bool,
    pub no_cache: bool,
    pub max_age: Option<u64>,
    pub s_maxage: Option<u64>,
}

impl CacheControl {
    pub fn parse(value: &str) -> Self {
        let mut cc = CacheControl::default();
        for directive in value.split(',') {
            let directive = directive.trim().to_ascii_lowercase();
            let (name, arg) = match directive.split_once('=') {
                Some((name, arg)) => (name.trim(), Some(arg.trim().trim_matches('"'))),
                None => (directive.as_str(), None),
            };
            match name {
                "public" => cc.public = true,
                "private" => cc.private = true,
                "no-store" => cc.no_store = true,
                "no-cache" => cc.no_cache = true,
                // a non-numeric max-age falls back to the default TTL
                "max-age" => cc.max_age = arg.and_then(|a| a.parse().ok()),
                "s-maxage" => cc.s_maxage = arg.and_then(|a| a.parse().ok()),
                _ => {}
            }
        }
        cc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_cc(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn respect_honors_public_max_age() {
        let ttl = cache_ttl(CachingMode::Respect, &with_cc("public, max-age=60"));
        assert_eq!(ttl, Some(Duration::from_secs(60)));
    }

    #[test]
    fn respect_defaults_when_max_age_missing_or_garbage() {
        assert_eq!(cache_ttl(CachingMode::Respect, &with_cc("public")), Some(DEFAULT_TTL));
        assert_eq!(
            cache_ttl(CachingMode::Respect, &with_cc("public, max-age=soon")),
            Some(DEFAULT_TTL)
        );
    }

    #[test]
    fn respect_refuses_non_public() {
        assert_eq!(cache_ttl(CachingMode::Respect, &with_cc("no-store")), None);
        assert_eq!(cache_ttl(CachingMode::Respect, &with_cc("private, max-age=60")), None);
        assert_eq!(cache_ttl(CachingMode::Respect, &with_cc("public, no-store")), None);
        assert_eq!(cache_ttl(CachingMode::Respect, &with_cc("max-age=60")), None);
        assert_eq!(cache_ttl(CachingMode::Respect, &HeaderMap::new()), None);
    }

    #[test]
    fn override_ignores_directives() {
        assert_eq!(cache_ttl(CachingMode::Override, &with_cc("no-store")), Some(DEFAULT_TTL));
        assert_eq!(cache_ttl(CachingMode::Disabled, &with_cc("public")), None);
    }

    #[test]
    fn only_get_ok_is_cacheable() {
        assert!(is_cacheable_exchange(&Method::GET, StatusCode::OK));
        assert!(!is_cacheable_exchange(&Method::POST, StatusCode::OK));
        assert!(!is_cacheable_exchange(&Method::GET, StatusCode::NOT_FOUND));
    }
}
