//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Backend addresses are absolute http URLs, listed once
//! - Validate value ranges (durations within 1..=MAX_DURATION_SECS, addresses parse)
//! - An enabled admin API needs a real key
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{AdminConfig, ProxyConfig};

/// Upper bound for every duration setting (one day).
pub const MAX_DURATION_SECS: u64 = 86_400;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one backend is required")]
    NoBackends,

    #[error("backend address '{address}' is invalid: {reason}")]
    InvalidBackend { address: String, reason: String },

    #[error("backend address '{0}' is listed more than once")]
    DuplicateBackend(String),

    #[error("{field} '{value}' is not a valid socket address")]
    InvalidSocketAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{field} must be at most {max} seconds")]
    TooLarge { field: &'static str, max: u64 },

    #[error("admin.api_key must be set to a non-default value when the admin API is enabled")]
    WeakApiKey,
}

/// Parse a backend address into the URL used as its identity.
pub fn parse_backend_url(address: &str) -> Result<Url, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidBackend {
        address: address.to_string(),
        reason,
    };

    let url = Url::parse(address.trim()).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    let mut seen: Vec<Url> = Vec::new();
    for backend in &config.backends {
        match parse_backend_url(&backend.address) {
            Ok(url) if seen.contains(&url) => {
                errors.push(ValidationError::DuplicateBackend(backend.address.clone()));
            }
            Ok(url) => seen.push(url),
            Err(e) => errors.push(e),
        }
    }

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_socket_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        let key = config.admin.api_key.trim();
        if key.is_empty() || key == AdminConfig::PLACEHOLDER_API_KEY {
            errors.push(ValidationError::WeakApiKey);
        }
    }
    if config.observability.metrics_enabled {
        check_socket_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if config.health_check.enabled {
        check_duration(&mut errors, "health_check.interval_secs", config.health_check.interval_secs);
        check_duration(&mut errors, "health_check.timeout_secs", config.health_check.timeout_secs);
    }
    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::Zero("retries.max_attempts"));
    }
    check_duration(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);
    check_duration(&mut errors, "timeouts.connect_secs", config.timeouts.connect_secs);
    if config.retries.backoff_ms > MAX_DURATION_SECS * 1000 {
        errors.push(ValidationError::TooLarge {
            field: "retries.backoff_ms",
            max: MAX_DURATION_SECS,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_duration(errors: &mut Vec<ValidationError>, field: &'static str, secs: u64) {
    if secs == 0 {
        errors.push(ValidationError::Zero(field));
    } else if secs > MAX_DURATION_SECS {
        errors.push(ValidationError::TooLarge {
            field,
            max: MAX_DURATION_SECS,
        });
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidSocketAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BackendConfig;

    fn config_with(backends: &[&str]) -> ProxyConfig {
        ProxyConfig {
            backends: backends.iter().map(|b| BackendConfig::from(*b)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid() {
        let config = config_with(&["http://127.0.0.1:3000", "http://localhost:3001/api"]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_backend_list() {
        let errors = validate_config(&ProxyConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoBackends]);
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = config_with(&[
            "http://127.0.0.1:3000",
            "not a url",
            "ftp://127.0.0.1:21",
            "http://127.0.0.1:3000/",
        ]);
        config.health_check.interval_secs = 0;
        config.listener.bind_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5, "{:?}", errors);
        assert!(matches!(errors[0], ValidationError::InvalidBackend { .. }));
        assert!(matches!(errors[1], ValidationError::InvalidBackend { .. }));
        assert_eq!(errors[2], ValidationError::DuplicateBackend("http://127.0.0.1:3000/".into()));
        assert!(matches!(errors[3], ValidationError::InvalidSocketAddress { field: "listener.bind_address", .. }));
        assert_eq!(errors[4], ValidationError::Zero("health_check.interval_secs"));
    }

    #[test]
    fn test_huge_durations_rejected() {
        let mut config = config_with(&["http://127.0.0.1:3000"]);
        config.timeouts.request_secs = u64::MAX;
        config.health_check.interval_secs = u64::MAX;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::TooLarge { field: "health_check.interval_secs", max: MAX_DURATION_SECS },
                ValidationError::TooLarge { field: "timeouts.request_secs", max: MAX_DURATION_SECS },
            ]
        );

        config.timeouts.request_secs = MAX_DURATION_SECS;
        config.health_check.interval_secs = MAX_DURATION_SECS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_enabled_admin_needs_real_key() {
        let mut config = config_with(&["http://127.0.0.1:3000"]);
        config.admin.enabled = true;
        assert_eq!(validate_config(&config).unwrap_err(), vec![ValidationError::WeakApiKey]);

        config.admin.api_key = "  ".into();
        assert_eq!(validate_config(&config).unwrap_err(), vec![ValidationError::WeakApiKey]);

        config.admin.api_key = "s3cret".into();
        assert!(validate_config(&config).is_ok());

        // placeholder is fine while the API is off
        config.admin.enabled = false;
        config.admin.api_key = AdminConfig::PLACEHOLDER_API_KEY.into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_disabled_probe_skips_interval_check() {
        let mut config = config_with(&["http://127.0.0.1:3000"]);
        config.health_check.enabled = false;
        config.health_check.interval_secs = 0;
        assert!(validate_config(&config).is_ok());
    }
}
