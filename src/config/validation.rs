//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect conflicting dispatch options
//! - The build wait must end before the request timeout
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DevServerConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use crate::config::schema::DevServerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),
    #[error("dispatch.remove_pathname_prefix requires automatically_remove_pathname_prefix = false")]
    ConflictingPrefixOptions,
    #[error("dispatch.remove_pathname_prefix must start with `/`")]
    RelativePrefix,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("build.command must not be empty")]
    EmptyCommand,
    #[error("build.command requires build.watch_dir")]
    CommandWithoutWatchDir,
    #[error("build.wait_timeout_ms ({wait_ms}) must be less than timeouts.request_secs ({request_secs}s)")]
    WaitExceedsRequestTimeout { wait_ms: u64, request_secs: u64 },
    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &DevServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }

    // An empty prefix is the same as none.
    if let Some(prefix) = config.dispatch.remove_pathname_prefix.as_deref().filter(|p| !p.is_empty()) {
        if config.dispatch.automatically_remove_pathname_prefix {
            errors.push(ValidationError::ConflictingPrefixOptions);
        }
        if !prefix.starts_with('/') {
            errors.push(ValidationError::RelativePrefix);
        }
    }

    if config.build.wait_timeout_ms == 0 {
        errors.push(ValidationError::Zero("build.wait_timeout_ms"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    let (wait_ms, request_secs) = (config.build.wait_timeout_ms, config.timeouts.request_secs);
    if wait_ms > 0 && request_secs > 0 && wait_ms >= request_secs.saturating_mul(1000) {
        errors.push(ValidationError::WaitExceedsRequestTimeout { wait_ms, request_secs });
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("limits.max_body_bytes"));
    }

    if let Some(command) = &config.build.command {
        if command.is_empty() {
            errors.push(ValidationError::EmptyCommand);
        }
        if config.build.watch_dir.is_none() {
            errors.push(ValidationError::CommandWithoutWatchDir);
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
