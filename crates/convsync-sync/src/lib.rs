// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation synchronization engine.
//!
//! Keeps one conversation's message timeline consistent while data arrives
//! from three concurrent sources:
//! - the initial fetch, an ordered chain of REST strategies ([`fetch`])
//! - live row-change events from the push transport ([`router`])
//! - backward "load older" pagination ([`pager`])
//!
//! Heterogeneous wire records are reconciled by the [`normalizer`] and merged
//! into a [`timeline::TimelineStore`]. A [`session::ConversationSession`] ties
//! everything together on a single actor task per open conversation.

pub mod fetch;
pub mod fixtures;
pub mod normalizer;
pub mod notifications;
pub mod pager;
pub mod router;
pub mod session;
pub mod state;
pub mod timeline;

pub use fetch::{FetchChain, FetchSource, FetchStrategy, InitialFetch};
pub use normalizer::{Attribution, AttributionRule, attribute, normalize, normalize_batch};
pub use notifications::{AckOutcome, NotificationChannel};
pub use pager::{HistoryPager, PageLoad, ScrollRestore};
pub use router::{EventRouter, RouteOutcome};
pub use session::{
    ConversationSession, SessionCue, SessionHandle, SessionSettings, SessionSnapshot,
};
pub use state::{StateChange, StateTracker};
pub use timeline::{MergeOutcome, TimelineStore};
