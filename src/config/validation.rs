//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate ports, destinations, upstream references and public directories
//! - Detect conflicting listeners
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function over the config plus a filesystem probe for `public`
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{ProxyConfig, WorkerCount};
use crate::http::request::parse_destination;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no server instances configured")]
    NoInstances,
    #[error("port {0} is configured more than once")]
    DuplicatePort(u16),
    #[error("instance on port {0} requires an ssl section")]
    MissingSsl(u16),
    #[error("invalid destination `{destination}` for route `{path}`")]
    InvalidDestination { path: String, destination: String },
    #[error("invalid upstream `{0}`")]
    InvalidUpstream(String),
    #[error("init_upstream {index} is out of range for {len} upstreams")]
    InitUpstreamOutOfRange { index: usize, len: usize },
    #[error("workers must be at least 1")]
    ZeroWorkers,
    #[error("public directory `{0}` does not exist or is not a directory")]
    PublicDirMissing(String),
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.workers == WorkerCount::Fixed(0) {
        errors.push(ValidationError::ZeroWorkers);
    }

    if config.server.instances.is_empty() {
        errors.push(ValidationError::NoInstances);
    }

    let mut seen = HashSet::new();
    for instance in &config.server.instances {
        // port 0 asks the OS for an ephemeral port, so it never collides
        if instance.port != 0 && !seen.insert(instance.port) {
            errors.push(ValidationError::DuplicatePort(instance.port));
        }
        if instance.port == 443 && instance.ssl.is_none() {
            errors.push(ValidationError::MissingSsl(instance.port));
        }
        for route in &instance.routes {
            if parse_destination(&route.destination).is_err() {
                errors.push(ValidationError::InvalidDestination {
                    path: route.path.clone(),
                    destination: route.destination.clone(),
                });
            }
        }
        if let Some(public) = &instance.public {
            if !public.is_dir() {
                errors.push(ValidationError::PublicDirMissing(public.display().to_string()));
            }
        }
    }

    for upstream in &config.upstream {
        if parse_destination(upstream).is_err() {
            errors.push(ValidationError::InvalidUpstream(upstream.clone()));
        }
    }

    if let Some(index) = config.init_upstream {
        if !config.upstream.is_empty() && index >= config.upstream.len() {
            errors.push(ValidationError::InitUpstreamOutOfRange {
                index,
                len: config.upstream.len(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
