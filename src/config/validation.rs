//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that the upstream base maps to a relay target
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: GatewayConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::Semaphore;

use crate::config::schema::GatewayConfig;
use crate::relay::relay_target;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_sessions == 0 {
        errors.push(ValidationError::new("listener.max_sessions", "must be greater than 0"));
    } else if config.listener.max_sessions > Semaphore::MAX_PERMITS {
        errors.push(ValidationError::new(
            "listener.max_sessions",
            format!("must not exceed {}", Semaphore::MAX_PERMITS),
        ));
    }

    if let Err(e) = relay_target(&config.upstream.base_url, &config.upstream.relay_path) {
        errors.push(ValidationError::new("upstream.base_url", e.to_string()));
    }
    if !config.upstream.llm_path.starts_with('/') {
        errors.push(ValidationError::new("upstream.llm_path", "must start with '/'"));
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.connect_timeout_secs", "must be greater than 0"));
    }

    if config.relay.close_grace_ms == 0 {
        errors.push(ValidationError::new("relay.close_grace_ms", "must be greater than 0"));
    }
    if config.relay.max_message_bytes == 0 {
        errors.push(ValidationError::new("relay.max_message_bytes", "must be greater than 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
