// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend adapter trait for the messaging REST API.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ConvsyncError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ConversationKey, RawBatch};

/// Adapter for the REST surface of the messaging backend.
///
/// Every message endpoint returns raw records; shape reconciliation happens in
/// the synchronization engine, not here. The three unpaginated message
/// endpoints exist because the backend is deployed unevenly and any of them
/// may be missing or empty for a given conversation.
#[async_trait]
pub trait MessageBackend: PluginAdapter {
    /// Conversation-scoped endpoint keyed by platform and contact.
    async fn conversation_messages(&self, key: &ConversationKey)
    -> Result<RawBatch, ConvsyncError>;

    /// Generic message list filtered by platform and contact.
    async fn message_list(
        &self,
        key: &ConversationKey,
        limit: usize,
    ) -> Result<RawBatch, ConvsyncError>;

    /// Platform-specific message endpoint.
    async fn platform_messages(&self, key: &ConversationKey) -> Result<RawBatch, ConvsyncError>;

    /// One page of history, `offset` records back from the newest message.
    async fn message_page(
        &self,
        key: &ConversationKey,
        limit: usize,
        offset: usize,
    ) -> Result<RawBatch, ConvsyncError>;

    /// Current workflow state row for the conversation, if any.
    async fn conversation_state(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<Value>, ConvsyncError>;

    /// Existing notifications addressed to `recipient`.
    async fn notifications(&self, recipient: &str) -> Result<Vec<Value>, ConvsyncError>;

    /// Marks a notification as read on the server.
    async fn acknowledge_notification(&self, id: &str) -> Result<(), ConvsyncError>;
}
