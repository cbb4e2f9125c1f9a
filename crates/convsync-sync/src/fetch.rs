// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Initial fetch: an ordered chain of REST strategies with an offline fallback.
//!
//! Strategies run strictly in order and the first one producing at least one
//! usable message wins; later strategies are never called. A failing strategy
//! counts as zero results. Only when every strategy failed outright and no
//! fixtures are available does the fetch carry a soft error.

use std::fmt;

use serde::Serialize;
use strum::Display;
use tracing::{debug, info, warn};

use convsync_core::{ConversationKey, ConvsyncError, Message, MessageBackend, RawBatch};

use crate::fixtures;
use crate::normalizer::normalize_batch;
use crate::timeline::TimelineStore;

/// One REST data source, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Conversation-scoped endpoint keyed by platform and contact.
    Conversation,
    /// Generic message list filtered by platform and contact.
    MessageList,
    /// Platform-specific message endpoint.
    Platform,
}

impl FetchStrategy {
    /// Evaluation order of the chain.
    pub const CHAIN: [FetchStrategy; 3] = [
        FetchStrategy::Conversation,
        FetchStrategy::MessageList,
        FetchStrategy::Platform,
    ];

    async fn run(
        self,
        backend: &dyn MessageBackend,
        key: &ConversationKey,
        limit: usize,
    ) -> Result<RawBatch, ConvsyncError> {
        match self {
            FetchStrategy::Conversation => backend.conversation_messages(key).await,
            FetchStrategy::MessageList => backend.message_list(key, limit).await,
            FetchStrategy::Platform => backend.platform_messages(key).await,
        }
    }
}

/// Where the initial messages came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchSource {
    /// Not fetched yet.
    #[default]
    Pending,
    Backend(FetchStrategy),
    Fixtures,
    /// Nothing produced any message.
    Empty,
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchSource::Pending => f.write_str("pending"),
            FetchSource::Backend(strategy) => write!(f, "backend:{strategy}"),
            FetchSource::Fixtures => f.write_str("fixtures"),
            FetchSource::Empty => f.write_str("empty"),
        }
    }
}

/// Result of the initial fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialFetch {
    /// Ordered, deduplicated messages.
    pub messages: Vec<Message>,
    /// Whether older history exists.
    pub has_more: bool,
    /// Total count reported by the backend, when paginated.
    pub total: Option<u64>,
    pub source: FetchSource,
    /// Set only when every strategy failed and no fixtures were available.
    pub soft_error: Option<String>,
}

/// The ordered strategy chain for one conversation.
#[derive(Debug, Clone, Copy)]
pub struct FetchChain {
    limit: usize,
    use_fixtures: bool,
}

impl FetchChain {
    pub fn new(limit: usize, use_fixtures: bool) -> Self {
        Self {
            limit,
            use_fixtures,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Runs the chain for `key`.
    pub async fn run(&self, backend: &dyn MessageBackend, key: &ConversationKey) -> InitialFetch {
        let mut failures = Vec::new();

        for strategy in FetchStrategy::CHAIN {
            match strategy.run(backend, key, self.limit).await {
                Ok(batch) => {
                    let raw_count = batch.records.len();
                    let messages = normalize_batch(&batch.records, key);
                    if messages.is_empty() {
                        debug!(
                            %strategy,
                            conversation = %key,
                            raw_count,
                            "strategy yielded no messages"
                        );
                        continue;
                    }

                    let (has_more, total) = match batch.pagination {
                        Some(p) => (p.has_more, p.total),
                        None => (raw_count >= self.limit, None),
                    };
                    let messages = TimelineStore::from_messages(messages).into_messages();
                    info!(
                        %strategy,
                        conversation = %key,
                        count = messages.len(),
                        has_more,
                        "initial fetch complete"
                    );
                    return InitialFetch {
                        messages,
                        has_more,
                        total,
                        source: FetchSource::Backend(strategy),
                        soft_error: None,
                    };
                }
                Err(e) => {
                    warn!(%strategy, conversation = %key, error = %e, "fetch strategy failed");
                    failures.push(format!("{strategy}: {e}"));
                }
            }
        }

        if self.use_fixtures {
            let messages = normalize_batch(&fixtures::sample_conversation(key), key);
            if !messages.is_empty() {
                info!(conversation = %key, count = messages.len(), "using offline fixtures");
                return InitialFetch {
                    messages: TimelineStore::from_messages(messages).into_messages(),
                    has_more: false,
                    total: None,
                    source: FetchSource::Fixtures,
                    soft_error: None,
                };
            }
        }

        let soft_error = (failures.len() == FetchStrategy::CHAIN.len()).then(|| {
            format!("could not load messages ({})", failures.join("; "))
        });
        if soft_error.is_some() {
            warn!(conversation = %key, "every fetch strategy failed");
        }

        InitialFetch {
            messages: Vec::new(),
            has_more: false,
            total: None,
            source: FetchSource::Empty,
            soft_error,
        }
    }
}
