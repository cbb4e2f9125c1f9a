// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the convsync conversation synchronization engine.
//!
//! This crate provides the canonical data model, the shared error type, and the
//! adapter traits the REST backend and push transport implement.

pub mod error;
pub mod time;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ConvsyncError;
pub use types::{
    AdapterType, ChangeEvent, ChangeKind, ChangeTable, ConversationKey, ConversationState,
    ConversationStatus, Direction, HealthStatus, Message, MessageStatus, MessageType,
    Notification, NotificationKind, Pagination, Platform, Priority, RawBatch, SenderRole, Topic,
};

pub use traits::{MessageBackend, PluginAdapter, PushTransport};
