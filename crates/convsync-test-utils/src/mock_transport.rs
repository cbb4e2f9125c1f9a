// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock push transport for deterministic testing.
//!
//! `MockTransport` implements `PushTransport`; tests inject change events with
//! [`MockTransport::emit`] and they are delivered to every live subscription on
//! the event's table. Cancelled subscriptions stop receiving, as a real
//! transport would after leaving the channel.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use convsync_core::traits::adapter::PluginAdapter;
use convsync_core::traits::transport::PushTransport;
use convsync_core::types::{AdapterType, ChangeEvent, ChangeTable, HealthStatus, Topic};
use convsync_core::ConvsyncError;

struct Subscription {
    topic: Topic,
    tx: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
}

pub struct MockTransport {
    subscriptions: Mutex<Vec<Subscription>>,
    failing: HashSet<ChangeTable>,
    buffer: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            buffer: 64,
        }
    }

    /// Reject subscriptions to `table`.
    pub fn failing_on(mut self, table: ChangeTable) -> Self {
        self.failing.insert(table);
        self
    }

    /// Deliver `event` to every live subscription on its table.
    ///
    /// Returns how many subscriptions received it.
    pub async fn emit(&self, event: ChangeEvent) -> usize {
        let subscriptions = self.subscriptions.lock().await;
        let mut delivered = 0;
        for sub in subscriptions.iter() {
            if sub.topic.table() != event.table || sub.cancel.is_cancelled() {
                continue;
            }
            if sub.tx.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Topics subscribed so far, in order.
    pub async fn topics(&self) -> Vec<Topic> {
        self.subscriptions
            .lock()
            .await
            .iter()
            .map(|s| s.topic.clone())
            .collect()
    }

    /// Whether every subscription's token has been cancelled.
    pub async fn all_cancelled(&self) -> bool {
        self.subscriptions
            .lock()
            .await
            .iter()
            .all(|s| s.cancel.is_cancelled())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, ConvsyncError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ConvsyncError> {
        for sub in self.subscriptions.lock().await.iter() {
            sub.cancel.cancel();
        }
        Ok(())
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn subscribe(
        &self,
        topic: Topic,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<ChangeEvent>, ConvsyncError> {
        if self.failing.contains(&topic.table()) {
            return Err(ConvsyncError::transport(format!(
                "join rejected for {}",
                topic.table()
            )));
        }
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscriptions
            .lock()
            .await
            .push(Subscription { topic, tx, cancel });
        Ok(rx)
    }
}
