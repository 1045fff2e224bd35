//! Configuration validation.
//!
//! Semantic checks on top of serde's syntactic ones. Returns every error
//! found, not just the first, so operators fix a config in one pass.

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use super::schema::AgentConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidBindAddress(String),
    InvalidMetricsAddress(String),
    InvalidRuntimeEndpoint(String),
    MissingAuthorizationEndpoint,
    InvalidAuthorizationEndpoint(String),
    ZeroBodyLimit,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidBindAddress(addr) => {
                write!(f, "listener.bind_address {addr:?} is not a socket address")
            }
            ValidationError::InvalidMetricsAddress(addr) => {
                write!(f, "observability.metrics_address {addr:?} is not a socket address")
            }
            ValidationError::InvalidRuntimeEndpoint(url) => {
                write!(f, "runtime.endpoint {url:?} is not a valid URL")
            }
            ValidationError::MissingAuthorizationEndpoint => {
                write!(f, "authorization.endpoint is required when authorization is enabled")
            }
            ValidationError::InvalidAuthorizationEndpoint(url) => {
                write!(f, "authorization.endpoint {url:?} is not a valid URL")
            }
            ValidationError::ZeroBodyLimit => {
                write!(f, "api.max_body_size must be greater than zero")
            }
        }
    }
}

/// Validate a parsed configuration, collecting all errors.
pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if Url::parse(&config.runtime.endpoint).is_err() {
        errors.push(ValidationError::InvalidRuntimeEndpoint(
            config.runtime.endpoint.clone(),
        ));
    }

    if config.authorization.enabled {
        if config.authorization.endpoint.is_empty() {
            errors.push(ValidationError::MissingAuthorizationEndpoint);
        } else if Url::parse(&config.authorization.endpoint).is_err() {
            errors.push(ValidationError::InvalidAuthorizationEndpoint(
                config.authorization.endpoint.clone(),
            ));
        }
    }

    if config.api.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
