// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as URL schemes, page size bounds, and known log levels.

use crate::diagnostic::ConfigError;
use crate::model::ConvsyncConfig;

/// Largest page the backend accepts for `limit`.
const MAX_PAGE_SIZE: usize = 200;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ConvsyncConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let base_url = config.backend.base_url.trim();
    if base_url.is_empty() {
        errors.push(ConfigError::Validation {
            message: "backend.base_url must not be empty".to_string(),
        });
    } else if !has_scheme(base_url, &["http://", "https://"]) {
        errors.push(ConfigError::Validation {
            message: format!("backend.base_url `{base_url}` must start with http:// or https://"),
        });
    }

    if let Some(url) = config.realtime.url.as_deref()
        && !has_scheme(url.trim(), &["ws://", "wss://"])
    {
        errors.push(ConfigError::Validation {
            message: format!("realtime.url `{url}` must start with ws:// or wss://"),
        });
    }

    if config.realtime.heartbeat_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "realtime.heartbeat_secs must be at least 1".to_string(),
        });
    }

    for (key, table) in [
        ("realtime.schema", &config.realtime.schema),
        ("realtime.messages_table", &config.realtime.messages_table),
        ("realtime.states_table", &config.realtime.states_table),
        ("realtime.notifications_table", &config.realtime.notifications_table),
    ] {
        if table.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("{key} must not be empty"),
            });
        }
    }

    if config.sync.page_size == 0 || config.sync.page_size > MAX_PAGE_SIZE {
        errors.push(ConfigError::Validation {
            message: format!(
                "sync.page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                config.sync.page_size
            ),
        });
    }

    if config.sync.initial_limit == 0 {
        errors.push(ConfigError::Validation {
            message: "sync.initial_limit must be at least 1".to_string(),
        });
    }

    if config.sync.event_buffer == 0 {
        errors.push(ConfigError::Validation {
            message: "sync.event_buffer must be at least 1".to_string(),
        });
    }

    let level = config.logging.level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "logging.level `{}` is not one of {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    let lower = url.to_ascii_lowercase();
    schemes
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ConvsyncConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ConvsyncConfig::default();
        config.backend.base_url = "ftp://example.com".into();
        config.sync.page_size = 0;
        config.logging.level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn realtime_url_requires_websocket_scheme() {
        let mut config = ConvsyncConfig::default();
        config.realtime.url = Some("https://realtime.example.com".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("realtime.url"));

        config.realtime.url = Some("wss://realtime.example.com/socket".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn oversized_page_is_rejected() {
        let mut config = ConvsyncConfig::default();
        config.sync.page_size = MAX_PAGE_SIZE + 1;
        assert!(validate_config(&config).is_err());
    }
}
