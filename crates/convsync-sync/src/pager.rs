// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backward "load older" pagination.
//!
//! The offset starts at 0 and is advanced by the page size after each
//! successful page, independent of how many messages the initial fetch
//! returned. The first page therefore overlaps the initial fetch, and messages
//! pushed between pages shift the server-side offsets, which can skip or
//! repeat a record. Repeats are absorbed by the timeline's dedup; skips are not
//! detected. A timestamp or id cursor would remove both, but the backend only
//! pages by offset.

use serde::Serialize;
use tracing::{debug, warn};

use convsync_core::{ConversationKey, ConvsyncError, MessageBackend, RawBatch};

use crate::normalizer::normalize_batch;
use crate::timeline::TimelineStore;

/// Instruction for the view to keep its scroll anchor after older messages
/// were prepended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScrollRestore {
    /// Scroll height of the content before the merge.
    pub previous_scroll_height: f64,
}

impl ScrollRestore {
    /// Distance to scroll down once layout has settled.
    pub fn delta(&self, new_scroll_height: f64) -> f64 {
        new_scroll_height - self.previous_scroll_height
    }
}

/// A page the pager has committed to fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

/// A successfully merged page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLoad {
    /// Messages that were not already in the timeline.
    pub inserted: usize,
    pub restore: ScrollRestore,
}

#[derive(Debug, Clone)]
pub struct HistoryPager {
    page_size: usize,
    offset: usize,
    has_more: bool,
    total: Option<u64>,
    in_flight: bool,
    error: Option<String>,
}

impl HistoryPager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            offset: 0,
            has_more: false,
            total: None,
            in_flight: false,
            error: None,
        }
    }

    /// Takes `has_more` and `total` from the initial fetch. The offset stays
    /// where it is.
    pub fn seed(&mut self, has_more: bool, total: Option<u64>) {
        self.has_more = has_more;
        self.total = total;
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Retryable error from the last page, cleared by the next success.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Claims the next page. `None` while a page is in flight or when there is
    /// no more history.
    pub fn begin(&mut self) -> Option<PageRequest> {
        if self.in_flight || !self.has_more {
            debug!(
                in_flight = self.in_flight,
                has_more = self.has_more,
                "load older ignored"
            );
            return None;
        }
        self.in_flight = true;
        Some(PageRequest {
            limit: self.page_size,
            offset: self.offset,
        })
    }

    /// Applies the result of the page claimed by [`begin`](Self::begin).
    ///
    /// On failure the timeline and the offset are untouched.
    pub fn complete(
        &mut self,
        store: &mut TimelineStore,
        key: &ConversationKey,
        request: PageRequest,
        result: Result<RawBatch, ConvsyncError>,
        scroll_height: f64,
    ) -> Result<PageLoad, ConvsyncError> {
        self.in_flight = false;

        let batch = match result {
            Ok(batch) => batch,
            Err(e) => {
                warn!(
                    conversation = %key,
                    offset = request.offset,
                    error = %e,
                    "failed to load older messages"
                );
                self.error = Some(format!("error loading older messages: {e}"));
                return Err(e);
            }
        };

        let raw_count = batch.records.len();
        let inserted = store.merge_all(normalize_batch(&batch.records, key));

        match batch.pagination {
            Some(p) => {
                self.has_more = p.has_more;
                if p.total.is_some() {
                    self.total = p.total;
                }
            }
            None => self.has_more = raw_count >= request.limit,
        }
        self.offset += self.page_size;
        self.error = None;

        debug!(
            conversation = %key,
            inserted,
            offset = self.offset,
            has_more = self.has_more,
            "merged older page"
        );

        Ok(PageLoad {
            inserted,
            restore: ScrollRestore {
                previous_scroll_height: scroll_height,
            },
        })
    }

    /// Fetches and merges the next page in one step.
    ///
    /// Returns `Ok(None)` without calling the backend when the pager is busy
    /// or has no more history.
    pub async fn load_older(
        &mut self,
        backend: &dyn MessageBackend,
        key: &ConversationKey,
        store: &mut TimelineStore,
        scroll_height: f64,
    ) -> Result<Option<PageLoad>, ConvsyncError> {
        let Some(request) = self.begin() else {
            return Ok(None);
        };
        let result = backend
            .message_page(key, request.limit, request.offset)
            .await;
        self.complete(store, key, request, result, scroll_height)
            .map(Some)
    }
}
