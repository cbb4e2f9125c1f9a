// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock REST backend for deterministic testing.
//!
//! `MockBackend` implements `MessageBackend` with a scripted answer per
//! endpoint and records every call, so tests can assert which endpoints were
//! (and were not) hit.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use convsync_core::traits::adapter::PluginAdapter;
use convsync_core::traits::backend::MessageBackend;
use convsync_core::types::{AdapterType, ConversationKey, HealthStatus, RawBatch};
use convsync_core::ConvsyncError;

/// A call received by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Conversation,
    MessageList { limit: usize },
    Platform,
    Page { limit: usize, offset: usize },
    State,
    Notifications { recipient: String },
    Acknowledge { id: String },
}

type Scripted<T> = Result<T, String>;

fn fail<T>(scripted: &Scripted<T>) -> Result<T, ConvsyncError>
where
    T: Clone,
{
    scripted
        .clone()
        .map_err(|message| ConvsyncError::http(message, Some(500)))
}

/// A mock backend that answers from per-endpoint scripts.
///
/// Unscripted endpoints answer with an empty success. History pages and
/// acknowledgements are popped from FIFO queues; when a queue is empty, pages
/// answer empty with no more history and acknowledgements succeed.
pub struct MockBackend {
    conversation: Scripted<RawBatch>,
    message_list: Scripted<RawBatch>,
    platform: Scripted<RawBatch>,
    state: Scripted<Option<Value>>,
    notifications: Scripted<Vec<Value>>,
    pages: Mutex<VecDeque<Scripted<RawBatch>>>,
    acks: Mutex<VecDeque<Scripted<()>>>,
    page_gate: Option<Arc<Notify>>,
    ack_gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<BackendCall>>,
}

impl MockBackend {
    /// Create a mock backend where every endpoint answers empty.
    pub fn new() -> Self {
        Self {
            conversation: Ok(RawBatch::default()),
            message_list: Ok(RawBatch::default()),
            platform: Ok(RawBatch::default()),
            state: Ok(None),
            notifications: Ok(Vec::new()),
            pages: Mutex::new(VecDeque::new()),
            acks: Mutex::new(VecDeque::new()),
            page_gate: None,
            ack_gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_conversation(mut self, batch: RawBatch) -> Self {
        self.conversation = Ok(batch);
        self
    }

    pub fn failing_conversation(mut self, message: &str) -> Self {
        self.conversation = Err(message.to_string());
        self
    }

    pub fn with_message_list(mut self, batch: RawBatch) -> Self {
        self.message_list = Ok(batch);
        self
    }

    pub fn failing_message_list(mut self, message: &str) -> Self {
        self.message_list = Err(message.to_string());
        self
    }

    pub fn with_platform(mut self, batch: RawBatch) -> Self {
        self.platform = Ok(batch);
        self
    }

    pub fn failing_platform(mut self, message: &str) -> Self {
        self.platform = Err(message.to_string());
        self
    }

    /// Make every message endpoint fail.
    pub fn failing_everywhere(self, message: &str) -> Self {
        self.failing_conversation(message)
            .failing_message_list(message)
            .failing_platform(message)
    }

    pub fn with_state(mut self, row: Value) -> Self {
        self.state = Ok(Some(row));
        self
    }

    pub fn with_notifications(mut self, rows: Vec<Value>) -> Self {
        self.notifications = Ok(rows);
        self
    }

    /// Hold every history page until `gate` is notified once per page.
    pub fn with_page_gate(mut self, gate: Arc<Notify>) -> Self {
        self.page_gate = Some(gate);
        self
    }

    /// Hold every acknowledgement until `gate` is notified once per call.
    pub fn with_ack_gate(mut self, gate: Arc<Notify>) -> Self {
        self.ack_gate = Some(gate);
        self
    }

    /// Queue the answer to the next history page.
    pub async fn push_page(&self, batch: RawBatch) {
        self.pages.lock().await.push_back(Ok(batch));
    }

    /// Queue a failure for the next history page.
    pub async fn push_page_error(&self, message: &str) {
        self.pages.lock().await.push_back(Err(message.to_string()));
    }

    /// Queue a failure for the next acknowledgement.
    pub async fn push_ack_error(&self, message: &str) {
        self.acks.lock().await.push_back(Err(message.to_string()));
    }

    /// All calls received so far, in order.
    pub async fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().await.clone()
    }

    /// Number of received calls matching `predicate`.
    pub async fn count(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|c| predicate(c)).count()
    }

    async fn record(&self, call: BackendCall) {
        self.calls.lock().await.push(call);
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, ConvsyncError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ConvsyncError> {
        Ok(())
    }
}

#[async_trait]
impl MessageBackend for MockBackend {
    async fn conversation_messages(
        &self,
        _key: &ConversationKey,
    ) -> Result<RawBatch, ConvsyncError> {
        self.record(BackendCall::Conversation).await;
        fail(&self.conversation)
    }

    async fn message_list(
        &self,
        _key: &ConversationKey,
        limit: usize,
    ) -> Result<RawBatch, ConvsyncError> {
        self.record(BackendCall::MessageList { limit }).await;
        fail(&self.message_list)
    }

    async fn platform_messages(&self, _key: &ConversationKey) -> Result<RawBatch, ConvsyncError> {
        self.record(BackendCall::Platform).await;
        fail(&self.platform)
    }

    async fn message_page(
        &self,
        _key: &ConversationKey,
        limit: usize,
        offset: usize,
    ) -> Result<RawBatch, ConvsyncError> {
        self.record(BackendCall::Page { limit, offset }).await;
        if let Some(gate) = &self.page_gate {
            gate.notified().await;
        }
        let next = self
            .pages
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(RawBatch::default()));
        fail(&next)
    }

    async fn conversation_state(
        &self,
        _key: &ConversationKey,
    ) -> Result<Option<Value>, ConvsyncError> {
        self.record(BackendCall::State).await;
        fail(&self.state)
    }

    async fn notifications(&self, recipient: &str) -> Result<Vec<Value>, ConvsyncError> {
        self.record(BackendCall::Notifications {
            recipient: recipient.to_string(),
        })
        .await;
        fail(&self.notifications)
    }

    async fn acknowledge_notification(&self, id: &str) -> Result<(), ConvsyncError> {
        self.record(BackendCall::Acknowledge { id: id.to_string() })
            .await;
        if let Some(gate) = &self.ack_gate {
            gate.notified().await;
        }
        let next = self.acks.lock().await.pop_front().unwrap_or(Ok(()));
        fail(&next)
    }
}
