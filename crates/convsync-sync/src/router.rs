// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routes message change events from the platform-wide push feed into the
//! timeline of the active conversation.

use serde_json::Value;
use tracing::trace;

use convsync_core::{ChangeEvent, ChangeKind, ChangeTable, ConversationKey, Direction, Platform};

use crate::normalizer::normalize;
use crate::timeline::{MergeOutcome, TimelineStore};

/// Record fields that may name a participant of the conversation.
const PARTICIPANT_FIELDS: &[&str] = &[
    "contact_id",
    "phone_number",
    "user_identifier",
    "from",
    "to",
    "sender_phone",
    "recipient_phone",
    "customer_phone",
];

/// What routing an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A new message was inserted.
    Created { id: String, direction: Direction },
    /// An existing message was replaced.
    Updated { id: String },
    /// Insert of a message already in the timeline.
    Duplicate,
    /// Update of a message not in the timeline.
    UnknownUpdate,
    /// Belongs to another conversation or table.
    Filtered,
    /// The record did not normalize.
    Dropped,
    /// Deletes are not applied.
    Ignored,
}

impl RouteOutcome {
    /// Whether the timeline changed.
    pub fn merged(&self) -> bool {
        matches!(self, RouteOutcome::Created { .. } | RouteOutcome::Updated { .. })
    }

    /// Whether the change warrants an incoming-message cue.
    pub fn is_incoming_insert(&self) -> bool {
        matches!(
            self,
            RouteOutcome::Created {
                direction: Direction::Incoming,
                ..
            }
        )
    }
}

#[derive(Debug, Clone)]
pub struct EventRouter {
    key: ConversationKey,
}

impl EventRouter {
    pub fn new(key: ConversationKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// Whether a raw message row belongs to the active conversation.
    pub fn is_relevant(&self, record: &Value) -> bool {
        let Some(fields) = record.as_object() else {
            return false;
        };

        if let Some(platform) = fields.get("platform").and_then(Value::as_str)
            && platform.parse::<Platform>().ok() != Some(self.key.platform())
        {
            return false;
        }

        PARTICIPANT_FIELDS.iter().any(|field| match fields.get(*field) {
            Some(Value::String(s)) => self.key.matches(s),
            Some(Value::Number(n)) => self.key.matches(&n.to_string()),
            _ => false,
        })
    }

    /// Filters, normalizes and merges one change event into `store`.
    pub fn apply(&self, store: &mut TimelineStore, event: &ChangeEvent) -> RouteOutcome {
        if event.table != ChangeTable::Messages {
            return RouteOutcome::Filtered;
        }
        if event.kind == ChangeKind::Delete {
            trace!(conversation = %self.key, "ignoring message delete");
            return RouteOutcome::Ignored;
        }
        if !self.is_relevant(&event.record) {
            return RouteOutcome::Filtered;
        }
        let Some(message) = normalize(&event.record, &self.key) else {
            return RouteOutcome::Dropped;
        };

        let id = message.id.clone();
        let direction = message.direction;
        let outcome = match event.kind {
            ChangeKind::Insert => store.insert(message),
            _ => store.update(message),
        };

        match outcome {
            MergeOutcome::Inserted => RouteOutcome::Created { id, direction },
            MergeOutcome::Replaced => RouteOutcome::Updated { id },
            MergeOutcome::Duplicate => RouteOutcome::Duplicate,
            MergeOutcome::Unknown => RouteOutcome::UnknownUpdate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convsync_core::MessageStatus;
    use serde_json::json;

    fn router() -> EventRouter {
        EventRouter::new(ConversationKey::new(Platform::Whatsapp, "+34 600 111 222"))
    }

    fn event(kind: ChangeKind, record: Value) -> ChangeEvent {
        ChangeEvent {
            table: ChangeTable::Messages,
            kind,
            record,
            old_record: None,
            commit_timestamp: None,
        }
    }

    fn row(id: &str, phone: &str, status: &str) -> Value {
        json!({
            "id": id,
            "platform": "whatsapp",
            "phone_number": phone,
            "is_from_contact": true,
            "content": "hola",
            "created_at": "2024-01-01T10:00:00Z",
            "status": status
        })
    }

    #[test]
    fn relevance_uses_canonical_phone() {
        let r = router();
        assert!(r.is_relevant(&json!({"phone_number": "34600111222"})));
        assert!(r.is_relevant(&json!({"to": "whatsapp:+34 600-111-222"})));
        assert!(r.is_relevant(&json!({"customer_phone": 34600111222_i64})));
        assert!(!r.is_relevant(&json!({"phone_number": "+34600999999"})));
        assert!(!r.is_relevant(&json!({"content": "no participants"})));
    }

    #[test]
    fn other_platform_is_filtered() {
        let r = router();
        let record = json!({"platform": "instagram", "contact_id": "+34600111222"});
        assert!(!r.is_relevant(&record));
    }

    #[test]
    fn insert_then_duplicate() {
        let r = router();
        let mut store = TimelineStore::new();
        let created = r.apply(
            &mut store,
            &event(ChangeKind::Insert, row("m1", "+34600111222", "sent")),
        );
        assert!(created.is_incoming_insert());
        assert!(created.merged());

        let again = r.apply(
            &mut store,
            &event(ChangeKind::Insert, row("m1", "+34600111222", "sent")),
        );
        assert_eq!(again, RouteOutcome::Duplicate);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_replaces_status() {
        let r = router();
        let mut store = TimelineStore::new();
        r.apply(&mut store, &event(ChangeKind::Insert, row("m1", "+34600111222", "sent")));
        let updated = r.apply(
            &mut store,
            &event(ChangeKind::Update, row("m1", "+34600111222", "read")),
        );
        assert_eq!(updated, RouteOutcome::Updated { id: "m1".into() });
        assert_eq!(store.get("m1").unwrap().status, MessageStatus::Read);
    }

    #[test]
    fn update_for_unknown_id_is_noop() {
        let r = router();
        let mut store = TimelineStore::new();
        let outcome = r.apply(
            &mut store,
            &event(ChangeKind::Update, row("ghost", "+34600111222", "read")),
        );
        assert_eq!(outcome, RouteOutcome::UnknownUpdate);
        assert!(store.is_empty());
    }

    #[test]
    fn foreign_conversation_and_deletes_do_not_merge() {
        let r = router();
        let mut store = TimelineStore::new();
        assert_eq!(
            r.apply(&mut store, &event(ChangeKind::Insert, row("x", "+15550000000", "sent"))),
            RouteOutcome::Filtered
        );
        assert_eq!(
            r.apply(&mut store, &event(ChangeKind::Delete, row("x", "+34600111222", "sent"))),
            RouteOutcome::Ignored
        );
        assert!(store.is_empty());
    }
}
