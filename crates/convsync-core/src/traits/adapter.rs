// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that the backend and transport adapters implement.

use async_trait::async_trait;

use crate::error::ConvsyncError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for all convsync adapters.
///
/// Provides identity, lifecycle, and health check capabilities shared by the
/// REST backend and the push transport.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the type of adapter (backend or transport).
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, ConvsyncError>;

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), ConvsyncError>;
}
