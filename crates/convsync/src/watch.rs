// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `convsync watch` command implementation.
//!
//! Opens a live session on one conversation and logs every cue until the
//! process is asked to stop, then closes the session.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use convsync_client::{RealtimeSettings, RealtimeTransport, RestBackend};
use convsync_config::ConvsyncConfig;
use convsync_core::{ConversationKey, ConvsyncError, PluginAdapter};
use convsync_sync::{ConversationSession, SessionCue, SessionHandle, SessionSettings};

use crate::shutdown;

/// Counters printed when a watch ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    pub incoming: usize,
    pub state_changes: usize,
    pub notifications: usize,
    pub lagged: u64,
}

/// One-line description of a cue for the log.
pub fn describe_cue(cue: &SessionCue) -> String {
    match cue {
        SessionCue::IncomingMessage { id } => format!("incoming message {id}"),
        SessionCue::StateChanged(change) => {
            format!("status {} -> {}: {}", change.from, change.to, change.notice.text)
        }
        SessionCue::Notification(n) => format!("notification [{}] {}", n.priority, n.title),
        SessionCue::ScrollRestore(restore) => {
            format!("older messages loaded (anchor {})", restore.previous_scroll_height)
        }
        SessionCue::PageFailed { error } => format!("page failed: {error}"),
    }
}

/// Logs cues from `handle` until `stop` is cancelled or the session ends.
pub async fn watch_session(handle: &SessionHandle, stop: CancellationToken) -> WatchSummary {
    let mut cues = handle.cues();
    let mut summary = WatchSummary::default();

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            cue = cues.recv() => match cue {
                Ok(cue) => {
                    match &cue {
                        SessionCue::IncomingMessage { .. } => summary.incoming += 1,
                        SessionCue::StateChanged(_) => summary.state_changes += 1,
                        SessionCue::Notification(_) => summary.notifications += 1,
                        SessionCue::ScrollRestore(_) | SessionCue::PageFailed { .. } => {}
                    }
                    let messages = handle.snapshot().messages.len();
                    info!(conversation = %handle.key(), messages, "{}", describe_cue(&cue));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "cue stream lagged");
                    summary.lagged += skipped;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    summary
}

/// Run the `convsync watch` command.
pub async fn run_watch(config: &ConvsyncConfig, key: ConversationKey) -> Result<(), ConvsyncError> {
    let backend = Arc::new(RestBackend::new(&config.backend)?);
    let transport = Arc::new(RealtimeTransport::new(RealtimeSettings::from_config(config)?));
    let stop = shutdown::install_signal_handler();

    let handle = ConversationSession::open(
        key,
        backend,
        transport.clone(),
        SessionSettings::from(&config.sync),
    )
    .await;

    let snapshot = handle.snapshot();
    info!(
        conversation = %handle.key(),
        messages = snapshot.messages.len(),
        source = %snapshot.source,
        has_more = snapshot.has_more,
        status = snapshot.state.as_ref().map(|s| s.current_status.to_string()).unwrap_or_default(),
        "watching conversation"
    );
    if let Some(soft_error) = &snapshot.soft_error {
        warn!(conversation = %handle.key(), "{soft_error}");
    }

    let summary = watch_session(&handle, stop).await;
    info!(
        incoming = summary.incoming,
        state_changes = summary.state_changes,
        notifications = summary.notifications,
        "watch ended"
    );

    handle.shutdown().await;
    transport.shutdown().await
}
