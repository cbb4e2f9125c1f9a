// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./convsync.toml` > `~/.config/convsync/convsync.toml` >
//! `/etc/convsync/convsync.toml` with environment variable overrides via the
//! `CONVSYNC_` prefix.

// figment::Error is external and cannot be boxed without a wrapper.
#![allow(clippy::result_large_err)]

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ConvsyncConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/convsync/convsync.toml` (system-wide)
/// 3. `~/.config/convsync/convsync.toml` (user XDG config)
/// 4. `./convsync.toml` (local directory)
/// 5. `CONVSYNC_*` environment variables
pub fn load_config() -> Result<ConvsyncConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ConvsyncConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConvsyncConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ConvsyncConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConvsyncConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ConvsyncConfig::default()))
        .merge(Toml::file("/etc/convsync/convsync.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("convsync/convsync.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("convsync.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `CONVSYNC_SYNC_PAGE_SIZE` must map to `sync.page_size`, not
/// `sync.page.size`.
fn env_provider() -> Env {
    Env::prefixed("CONVSYNC_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env var name to its dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    const SECTIONS: &[&str] = &["backend", "realtime", "sync", "logging"];
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
