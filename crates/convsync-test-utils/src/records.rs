// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for wire-shaped rows and change events.

use serde_json::{Value, json};

use convsync_core::{ChangeEvent, ChangeKind, ChangeTable, Pagination, RawBatch};

/// A message row in the shape the messages table pushes.
pub fn message_row(
    id: &str,
    phone: &str,
    content: &str,
    created_at: &str,
    from_contact: bool,
) -> Value {
    json!({
        "id": id,
        "platform": "whatsapp",
        "phone_number": phone,
        "is_from_contact": from_contact,
        "content": content,
        "created_at": created_at,
        "status": "sent",
    })
}

/// `count` message rows one minute apart, ids `{prefix}{n}`.
pub fn message_rows(prefix: &str, phone: &str, count: usize, hour: u32) -> Vec<Value> {
    (0..count)
        .map(|n| {
            message_row(
                &format!("{prefix}{n}"),
                phone,
                &format!("{prefix} message {n}"),
                &format!("2024-01-01T{hour:02}:{:02}:00Z", n % 60),
                n % 2 == 0,
            )
        })
        .collect()
}

/// A history page with an explicit pagination block.
pub fn page(records: Vec<Value>, has_more: bool, total: u64) -> RawBatch {
    RawBatch::new(records).with_pagination(Pagination {
        has_more,
        total: Some(total),
    })
}

/// A conversation state row.
pub fn state_row(user_identifier: &str, status: &str) -> Value {
    json!({
        "platform": "whatsapp",
        "user_identifier": user_identifier,
        "current_status": status,
        "status_data": {},
        "last_interaction": "2024-01-01T10:00:00Z",
    })
}

/// A notification row. `recipient: None` makes it a broadcast.
pub fn notification_row(id: &str, recipient: Option<&str>, created_at: &str) -> Value {
    json!({
        "id": id,
        "type": "agent_assigned",
        "title": "Conversation assigned",
        "message": "A conversation was assigned to you",
        "recipient": recipient,
        "priority": "high",
        "is_read": false,
        "created_at": created_at,
    })
}

pub fn change(table: ChangeTable, kind: ChangeKind, record: Value) -> ChangeEvent {
    ChangeEvent {
        table,
        kind,
        record,
        old_record: None,
        commit_timestamp: None,
    }
}

pub fn message_insert(record: Value) -> ChangeEvent {
    change(ChangeTable::Messages, ChangeKind::Insert, record)
}

pub fn message_update(record: Value) -> ChangeEvent {
    change(ChangeTable::Messages, ChangeKind::Update, record)
}

pub fn state_update(record: Value) -> ChangeEvent {
    change(ChangeTable::ConversationStates, ChangeKind::Update, record)
}

pub fn notification_insert(record: Value) -> ChangeEvent {
    change(ChangeTable::Notifications, ChangeKind::Insert, record)
}
