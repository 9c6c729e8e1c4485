//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, addresses parse)
//! - Check request-path shaped settings start at the root
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is not a socket address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must start with '/': {value:?}")]
    NotRooted { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is not a valid URL: {value:?}")]
    InvalidUrl { field: &'static str, value: String },
}

/// Check a parsed configuration for values the gateway cannot run with.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if let Some(tls) = &config.listener.tls {
        check_non_empty(&mut errors, "listener.tls.cert_path", &tls.cert_path);
        check_non_empty(&mut errors, "listener.tls.key_path", &tls.key_path);
    }

    check_non_empty(&mut errors, "static_files.root", &config.static_files.root);
    check_rooted(&mut errors, "static_files.index", &config.static_files.index);
    check_rooted(&mut errors, "websocket.path", &config.websocket.path);

    check_positive(&mut errors, "static_files.chunk_size", config.static_files.chunk_size as u64);
    check_positive(&mut errors, "websocket.max_frame_size", config.websocket.max_frame_size as u64);
    check_positive(&mut errors, "websocket.outbound_queue", config.websocket.outbound_queue as u64);
    check_positive(&mut errors, "broadcaster.interval_ms", config.broadcaster.interval_ms);
    check_positive(
        &mut errors,
        "broadcaster.fetch_timeout_secs",
        config.broadcaster.fetch_timeout_secs,
    );
    check_positive(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);

    if Url::parse(&config.quote_source.base_url).is_err() {
        errors.push(ValidationError::InvalidUrl {
            field: "quote_source.base_url",
            value: config.quote_source.base_url.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_non_empty(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError::Empty { field });
    }
}

fn check_rooted(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if !value.starts_with('/') {
        errors.push(ValidationError::NotRooted {
            field,
            value: value.to_string(),
        });
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.static_files.index = "index.html".into();
        config.broadcaster.interval_ms = 0;
        config.websocket.outbound_queue = 0;
        config.quote_source.base_url = "::nope".into();
        config.listener.tls = Some(TlsConfig {
            cert_path: String::new(),
            key_path: "key.pem".into(),
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::Zero {
            field: "broadcaster.interval_ms"
        }));
        assert!(errors.contains(&ValidationError::Zero {
            field: "websocket.outbound_queue"
        }));
        assert!(errors.contains(&ValidationError::Empty {
            field: "listener.tls.cert_path"
        }));
    }

    #[test]
    fn metrics_address_only_checked_when_enabled() {
        let mut config = GatewayConfig::default();
        config.observability.metrics_address = "bogus".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
