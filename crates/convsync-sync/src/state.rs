// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracks the backend-driven workflow status of a conversation.
//!
//! Transitions are never computed here. The tracker only compares what the
//! backend reports against what it last saw and describes the difference.

use serde::Serialize;
use serde_json::{Map, Value};
use strum::Display;
use tracing::{debug, trace};

use convsync_core::time::parse_timestamp;
use convsync_core::{ConversationKey, ConversationState, ConversationStatus, Platform};

/// Severity of a state-change notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
}

/// Operator-facing description of a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateNotice {
    pub level: NoticeLevel,
    pub text: String,
}

/// A status transition reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub from: ConversationStatus,
    pub to: ConversationStatus,
    pub notice: StateNotice,
}

/// Looks up the notice for `status` in the fixed status table.
pub fn notice_for(status: &ConversationStatus) -> StateNotice {
    let (level, text) = match status {
        ConversationStatus::MainMenu => (NoticeLevel::Info, "Customer is back at the main menu"),
        ConversationStatus::GeneratingAiOrder => {
            (NoticeLevel::Info, "The assistant is preparing an order")
        }
        ConversationStatus::HumanAgent => {
            (NoticeLevel::Warning, "Customer asked for a human agent")
        }
        ConversationStatus::ConfirmingAddress => {
            (NoticeLevel::Info, "Confirming the delivery address")
        }
        ConversationStatus::OrderCompleted => (NoticeLevel::Success, "Order completed"),
        ConversationStatus::AwaitingPayment => (NoticeLevel::Warning, "Waiting for payment"),
        ConversationStatus::GeneralInfo => {
            (NoticeLevel::Info, "Customer is reading general information")
        }
        ConversationStatus::Other(other) => {
            return StateNotice {
                level: NoticeLevel::Info,
                text: format!("Status changed to {other}"),
            };
        }
    };
    StateNotice {
        level,
        text: text.to_string(),
    }
}

/// Parses a conversation state row. `None` when it has no current status.
pub fn parse_state_row(record: &Value, key: &ConversationKey) -> Option<ConversationState> {
    let fields = record.as_object()?;

    let current_status = status_field(fields, &["current_status", "status"])?;
    let previous_status = status_field(fields, &["previous_status"]);
    let platform = fields
        .get("platform")
        .and_then(Value::as_str)
        .and_then(|p| p.parse::<Platform>().ok())
        .unwrap_or(key.platform());
    let user_identifier = ["user_identifier", "phone_number", "contact_id"]
        .iter()
        .find_map(|f| fields.get(*f).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| key.contact_id().to_string());
    let status_data = match fields.get("status_data") {
        Some(Value::Object(data)) => data.clone(),
        _ => Map::new(),
    };
    let last_interaction = ["last_interaction", "updated_at"]
        .iter()
        .find_map(|f| fields.get(*f).and_then(parse_timestamp));

    Some(ConversationState {
        platform,
        user_identifier,
        current_status,
        previous_status,
        status_data,
        last_interaction,
    })
}

fn status_field(fields: &Map<String, Value>, names: &[&str]) -> Option<ConversationStatus> {
    names
        .iter()
        .filter_map(|name| fields.get(*name).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(|s| ConversationStatus::from(s.to_string()))
}

/// Holds the last observed state and reports status changes.
#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    current: Option<ConversationState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&ConversationState> {
        self.current.as_ref()
    }

    /// Records an observation.
    ///
    /// The first observation only seeds the tracker. Later observations yield a
    /// [`StateChange`] when the status differs from the previous one.
    pub fn observe(&mut self, state: ConversationState) -> Option<StateChange> {
        let previous = self.current.replace(state);
        let (Some(previous), Some(current)) = (previous, self.current.as_ref()) else {
            trace!("seeded conversation state");
            return None;
        };

        if previous.current_status == current.current_status {
            return None;
        }

        debug!(
            from = %previous.current_status,
            to = %current.current_status,
            "conversation status changed"
        );
        Some(StateChange {
            from: previous.current_status,
            to: current.current_status.clone(),
            notice: notice_for(&current.current_status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> ConversationKey {
        ConversationKey::new(Platform::Whatsapp, "+34600111222")
    }

    fn state(status: &str) -> ConversationState {
        parse_state_row(
            &json!({"user_identifier": "+34600111222", "current_status": status}),
            &key(),
        )
        .unwrap()
    }

    #[test]
    fn parses_full_row() {
        let row = json!({
            "platform": "whatsapp",
            "user_identifier": "+34600111222",
            "current_status": "awaiting_payment",
            "previous_status": "confirming_address",
            "status_data": {"order_id": 17},
            "last_interaction": "2024-01-01T10:00:00Z"
        });
        let s = parse_state_row(&row, &key()).unwrap();
        assert_eq!(s.current_status, ConversationStatus::AwaitingPayment);
        assert_eq!(s.previous_status, Some(ConversationStatus::ConfirmingAddress));
        assert_eq!(s.status_data["order_id"], json!(17));
        assert!(s.last_interaction.is_some());
    }

    #[test]
    fn row_without_status_is_rejected() {
        assert!(parse_state_row(&json!({"user_identifier": "x"}), &key()).is_none());
        assert!(parse_state_row(&json!({"current_status": "  "}), &key()).is_none());
    }

    #[test]
    fn first_observation_seeds_silently() {
        let mut tracker = StateTracker::new();
        assert!(tracker.observe(state("main_menu")).is_none());
        assert_eq!(
            tracker.current().unwrap().current_status,
            ConversationStatus::MainMenu
        );
    }

    #[test]
    fn change_yields_mapped_notice() {
        let mut tracker = StateTracker::new();
        tracker.observe(state("main_menu"));
        let change = tracker.observe(state("human_agent")).unwrap();
        assert_eq!(change.from, ConversationStatus::MainMenu);
        assert_eq!(change.to, ConversationStatus::HumanAgent);
        assert_eq!(change.notice.level, NoticeLevel::Warning);
    }

    #[test]
    fn same_status_is_not_a_change() {
        let mut tracker = StateTracker::new();
        tracker.observe(state("main_menu"));
        assert!(tracker.observe(state("main_menu")).is_none());
    }

    #[test]
    fn unmapped_status_gets_generic_notice() {
        let mut tracker = StateTracker::new();
        tracker.observe(state("main_menu"));
        let change = tracker.observe(state("collecting_feedback")).unwrap();
        assert_eq!(change.notice.text, "Status changed to collecting_feedback");
    }
}
