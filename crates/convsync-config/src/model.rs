// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level convsync configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConvsyncConfig {
    /// Messaging backend REST API settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Realtime push service settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Synchronization engine tuning.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Messaging backend REST API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the dashboard API, without the `/api` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent as `apikey` and bearer token. `None` sends no credentials.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

/// Realtime push service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RealtimeConfig {
    /// Websocket endpoint of the realtime service. `None` disables live updates.
    #[serde(default)]
    pub url: Option<String>,

    /// API key appended to the socket URL. Falls back to `backend.api_key`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Seconds between heartbeat frames.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Database schema the change feeds are published from.
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Table carrying message rows.
    #[serde(default = "default_messages_table")]
    pub messages_table: String,

    /// Table carrying conversation workflow state rows.
    #[serde(default = "default_states_table")]
    pub states_table: String,

    /// Table carrying operator notifications.
    #[serde(default = "default_notifications_table")]
    pub notifications_table: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            heartbeat_secs: default_heartbeat_secs(),
            schema: default_schema(),
            messages_table: default_messages_table(),
            states_table: default_states_table(),
            notifications_table: default_notifications_table(),
        }
    }
}

fn default_heartbeat_secs() -> u64 {
    25
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_messages_table() -> String {
    "messages".to_string()
}

fn default_states_table() -> String {
    "conversation_states".to_string()
}

fn default_notifications_table() -> String {
    "notifications".to_string()
}

/// Synchronization engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Number of messages requested by the initial fetch.
    #[serde(default = "default_initial_limit")]
    pub initial_limit: usize,

    /// Number of messages requested per "load older" page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Fall back to deterministic offline fixtures when every fetch strategy
    /// comes back empty.
    #[serde(default = "default_use_fixtures")]
    pub use_fixtures: bool,

    /// Capacity of each push subscription's event buffer.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_limit: default_initial_limit(),
            page_size: default_page_size(),
            use_fixtures: default_use_fixtures(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_initial_limit() -> usize {
    50
}

fn default_page_size() -> usize {
    20
}

fn default_use_fixtures() -> bool {
    true
}

fn default_event_buffer() -> usize {
    256
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
