// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push transport trait for row-level change subscriptions.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ConvsyncError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChangeEvent, Topic};

/// Adapter for a long-lived push channel delivering row-level change events.
///
/// Subscriptions are owned by the caller through `cancel`: cancelling the token
/// must stop delivery and release the server-side subscription. Reconnection
/// is the transport's own concern.
#[async_trait]
pub trait PushTransport: PluginAdapter {
    /// Subscribes to `topic`, returning the receiving end of its event stream.
    async fn subscribe(
        &self,
        topic: Topic,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<ChangeEvent>, ConvsyncError>;
}
