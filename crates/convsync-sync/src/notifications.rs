// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator notifications for one conversation session.
//!
//! The notification feed is not filtered server-side, because the backing
//! table has no reliable recipient column under phone-based identities. Rows
//! without a recipient are treated as broadcasts; rows addressed to someone
//! else are dropped here.

use std::collections::HashSet;
use std::str::FromStr;

use serde_json::Value;
use tracing::trace;

use convsync_core::time::parse_timestamp;
use convsync_core::{
    ChangeEvent, ChangeKind, ChangeTable, ConversationKey, ConvsyncError, Notification,
    NotificationKind, Priority,
};

/// Parses a notification row. `None` when it lacks an id or a creation time.
pub fn parse_notification_row(record: &Value) -> Option<Notification> {
    let fields = record.as_object()?;

    let id = match fields.get("id")? {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let created_at = fields.get("created_at").and_then(parse_timestamp)?;

    let text = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| fields.get(*n).and_then(Value::as_str))
            .map(str::to_string)
    };

    let kind = text(&["type", "kind"])
        .map(NotificationKind::from)
        .unwrap_or(NotificationKind::System);
    let priority = text(&["priority"])
        .and_then(|p| Priority::from_str(p.trim()).ok())
        .unwrap_or_default();
    let recipient = text(&["recipient", "recipient_id", "user_identifier"])
        .filter(|r| !r.trim().is_empty());
    let is_read = ["is_read", "read"]
        .iter()
        .find_map(|n| fields.get(*n).and_then(Value::as_bool))
        .unwrap_or(false);

    Some(Notification {
        id,
        kind,
        title: text(&["title"]).unwrap_or_default(),
        message: text(&["message", "body"]).unwrap_or_default(),
        recipient,
        priority,
        is_read,
        created_at,
    })
}

/// What applying a notification event did.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationOutcome {
    Added(Notification),
    Updated(Notification),
    Duplicate,
    /// Addressed to another recipient.
    Filtered,
    /// Update for an id this channel never saw.
    UnknownUpdate,
    /// The row did not parse.
    Dropped,
    Ignored,
}

/// Result of a successful acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The backend confirmed and `is_read` flipped.
    Acknowledged,
    /// Already read; nothing was sent.
    AlreadyRead,
}

/// Whether an acknowledge needs a backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPlan {
    AlreadyRead,
    /// Another acknowledge of the same id is waiting on the backend.
    InFlight,
    Remote,
}

#[derive(Debug, Clone)]
pub struct NotificationChannel {
    recipient: ConversationKey,
    /// Newest first.
    items: Vec<Notification>,
    /// Ids with an acknowledge awaiting the backend.
    acking: HashSet<String>,
}

impl NotificationChannel {
    pub fn new(recipient: ConversationKey) -> Self {
        Self {
            recipient,
            items: Vec::new(),
            acking: HashSet::new(),
        }
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }

    /// Broadcasts and notifications addressed to this recipient are accepted.
    pub fn accepts(&self, notification: &Notification) -> bool {
        match notification.recipient.as_deref() {
            None => true,
            Some(recipient) => self.recipient.matches(recipient),
        }
    }

    fn place(&mut self, notification: Notification) {
        let at = self.items.partition_point(|n| {
            (n.created_at, n.id.as_str()) > (notification.created_at, notification.id.as_str())
        });
        self.items.insert(at, notification);
    }

    fn add(&mut self, notification: Notification) -> NotificationOutcome {
        if !self.accepts(&notification) {
            return NotificationOutcome::Filtered;
        }
        if self.get(&notification.id).is_some() {
            return NotificationOutcome::Duplicate;
        }
        self.place(notification.clone());
        NotificationOutcome::Added(notification)
    }

    fn replace(&mut self, mut notification: Notification) -> NotificationOutcome {
        if !self.accepts(&notification) {
            return NotificationOutcome::Filtered;
        }
        let Some(at) = self.items.iter().position(|n| n.id == notification.id) else {
            return NotificationOutcome::UnknownUpdate;
        };
        let previous = self.items.remove(at);
        // Read is terminal.
        notification.is_read |= previous.is_read;
        self.place(notification.clone());
        NotificationOutcome::Updated(notification)
    }

    /// Seeds the channel with rows loaded at session open.
    pub fn load(&mut self, rows: &[Value]) -> usize {
        rows.iter()
            .filter_map(parse_notification_row)
            .map(|n| self.add(n))
            .filter(|outcome| matches!(outcome, NotificationOutcome::Added(_)))
            .count()
    }

    /// Applies one push event from the notifications feed.
    pub fn apply(&mut self, event: &ChangeEvent) -> NotificationOutcome {
        if event.table != ChangeTable::Notifications {
            return NotificationOutcome::Ignored;
        }
        let Some(notification) = parse_notification_row(&event.record) else {
            trace!("dropping unparseable notification row");
            return NotificationOutcome::Dropped;
        };
        match event.kind {
            ChangeKind::Insert => self.add(notification),
            ChangeKind::Update => self.replace(notification),
            ChangeKind::Delete => NotificationOutcome::Ignored,
        }
    }

    /// Starts acknowledging `id`.
    ///
    /// Only [`AckPlan::Remote`] marks the id in flight; the caller must then
    /// report the backend result through [`finish_acknowledge`].
    ///
    /// [`finish_acknowledge`]: Self::finish_acknowledge
    pub fn begin_acknowledge(&mut self, id: &str) -> Result<AckPlan, ConvsyncError> {
        match self.get(id) {
            Some(n) if n.is_read => Ok(AckPlan::AlreadyRead),
            Some(_) if self.acking.contains(id) => Ok(AckPlan::InFlight),
            Some(_) => {
                self.acking.insert(id.to_string());
                Ok(AckPlan::Remote)
            }
            None => Err(ConvsyncError::Internal(format!(
                "unknown notification `{id}`"
            ))),
        }
    }

    /// Clears the in-flight mark for `id` and, when the backend confirmed,
    /// marks it read. Returns whether `is_read` flipped.
    pub fn finish_acknowledge(&mut self, id: &str, confirmed: bool) -> bool {
        self.acking.remove(id);
        confirmed && self.mark_read(id)
    }

    fn mark_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.is_read => {
                n.is_read = true;
                true
            }
            _ => false,
        }
    }
}
