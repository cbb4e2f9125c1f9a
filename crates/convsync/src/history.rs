// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `convsync history` command implementation.
//!
//! Runs the initial fetch chain, walks up to `--pages` older pages and prints
//! the merged timeline as JSON.

use serde::Serialize;
use tracing::info;

use convsync_client::RestBackend;
use convsync_config::ConvsyncConfig;
use convsync_config::model::SyncConfig;
use convsync_core::{ConversationKey, ConvsyncError, Message, MessageBackend};
use convsync_sync::{FetchChain, FetchSource, HistoryPager, TimelineStore};

/// Structured output of `convsync history`.
#[derive(Debug, Serialize)]
pub struct HistoryReport {
    pub conversation: String,
    pub source: FetchSource,
    pub pages_loaded: usize,
    pub has_more: bool,
    pub total: Option<u64>,
    pub soft_error: Option<String>,
    pub messages: Vec<Message>,
}

/// Fetches the conversation and up to `pages` older pages.
///
/// Stops early once the backend reports no more history.
pub async fn collect_history(
    backend: &dyn MessageBackend,
    key: &ConversationKey,
    sync: &SyncConfig,
    pages: usize,
) -> Result<HistoryReport, ConvsyncError> {
    let initial = FetchChain::new(sync.initial_limit, sync.use_fixtures)
        .run(backend, key)
        .await;

    let mut store = TimelineStore::from_messages(initial.messages);
    let mut pager = HistoryPager::new(sync.page_size);
    pager.seed(initial.has_more, initial.total);

    let mut pages_loaded = 0;
    while pages_loaded < pages {
        // No view here, so there is no scroll height to restore.
        match pager.load_older(backend, key, &mut store, 0.0).await? {
            Some(load) => {
                pages_loaded += 1;
                info!(
                    conversation = %key,
                    page = pages_loaded,
                    inserted = load.inserted,
                    "loaded older page"
                );
            }
            None => break,
        }
    }

    Ok(HistoryReport {
        conversation: key.conversation_id(),
        source: initial.source,
        pages_loaded,
        has_more: pager.has_more(),
        total: pager.total(),
        soft_error: initial.soft_error,
        messages: store.into_messages(),
    })
}

/// Run the `convsync history` command.
pub async fn run_history(
    config: &ConvsyncConfig,
    key: ConversationKey,
    pages: usize,
) -> Result<(), ConvsyncError> {
    let backend = RestBackend::new(&config.backend)?;
    let report = collect_history(&backend, &key, &config.sync, pages).await?;
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| ConvsyncError::Internal(format!("failed to serialize history: {e}")))?;
    println!("{json}");
    Ok(())
}
