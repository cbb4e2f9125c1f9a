// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ordered, deduplicated message timeline of one conversation.
//!
//! Messages form a set keyed by id, kept sorted by `(timestamp, id)`. Breaking
//! timestamp ties on the id makes the final order independent of the order in
//! which fetch results, pages and push events were merged.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use convsync_core::Message;

/// What a merge did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The message was new and has been inserted.
    Inserted,
    /// An existing message with the same id was replaced.
    Replaced,
    /// Insert of an id the store already holds; nothing changed.
    Duplicate,
    /// Update of an id the store does not hold; nothing changed.
    Unknown,
}

impl MergeOutcome {
    /// Whether the store changed.
    pub fn changed(self) -> bool {
        matches!(self, MergeOutcome::Inserted | MergeOutcome::Replaced)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimelineStore {
    messages: Vec<Message>,
    ids: HashSet<String>,
}

fn order_key(message: &Message) -> (DateTime<Utc>, &str) {
    (message.timestamp, message.id.as_str())
}

impl TimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from messages in any order.
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut store = Self::new();
        store.merge_all(messages);
        store
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.position(id).map(|at| &self.messages[at])
    }

    pub fn oldest(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn newest(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn position(&self, id: &str) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.messages.iter().position(|m| m.id == id)
    }

    fn place(&mut self, message: Message) {
        let at = self
            .messages
            .partition_point(|m| order_key(m) < order_key(&message));
        self.ids.insert(message.id.clone());
        self.messages.insert(at, message);
    }

    /// Inserts a new message. Inserting an id that is already held is a no-op.
    pub fn insert(&mut self, message: Message) -> MergeOutcome {
        if self.contains(&message.id) {
            return MergeOutcome::Duplicate;
        }
        self.place(message);
        MergeOutcome::Inserted
    }

    /// Replaces the message with the same id and restores ordering.
    /// Updating an id that is not held never inserts it.
    pub fn update(&mut self, message: Message) -> MergeOutcome {
        let Some(at) = self.position(&message.id) else {
            return MergeOutcome::Unknown;
        };
        self.messages.remove(at);
        self.place(message);
        MergeOutcome::Replaced
    }

    /// Inserts every message not already held, returning how many were new.
    ///
    /// Older pages land in front of the timeline through the same ordering,
    /// never at the end.
    pub fn merge_all(&mut self, messages: impl IntoIterator<Item = Message>) -> usize {
        messages
            .into_iter()
            .map(|m| self.insert(m))
            .filter(|outcome| *outcome == MergeOutcome::Inserted)
            .count()
    }
}
