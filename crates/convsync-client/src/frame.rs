// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phoenix channel frames spoken by the realtime service.
//!
//! Every websocket text message is one JSON object with `topic`, `event`,
//! `payload` and `ref`. A subscription joins one channel whose join payload
//! carries a `postgres_changes` config; row changes then arrive as
//! `postgres_changes` frames on that channel.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use convsync_config::model::RealtimeConfig;
use convsync_core::time::parse_timestamp;
use convsync_core::{ChangeEvent, ChangeKind, ChangeTable, ConvsyncError, Topic};

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const POSTGRES_CHANGES: &str = "postgres_changes";

const PHOENIX_TOPIC: &str = "phoenix";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl Frame {
    pub fn encode(&self) -> Result<String, ConvsyncError> {
        serde_json::to_string(self)
            .map_err(|e| ConvsyncError::Internal(format!("failed to encode frame: {e}")))
    }

    pub fn decode(text: &str) -> Result<Self, ConvsyncError> {
        serde_json::from_str(text)
            .map_err(|e| ConvsyncError::Decode(format!("malformed realtime frame: {e}")))
    }

    /// Status of a `phx_reply` frame: `("ok" | "error", response)`.
    pub fn reply_status(&self) -> Option<(&str, &Value)> {
        if self.event != PHX_REPLY {
            return None;
        }
        let status = self.payload.get("status")?.as_str()?;
        Some((status, self.payload.get("response").unwrap_or(&Value::Null)))
    }
}

/// Schema and table names of the three watched tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub schema: String,
    pub messages: String,
    pub conversation_states: String,
    pub notifications: String,
}

impl From<&RealtimeConfig> for TableNames {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            schema: config.schema.clone(),
            messages: config.messages_table.clone(),
            conversation_states: config.states_table.clone(),
            notifications: config.notifications_table.clone(),
        }
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self::from(&RealtimeConfig::default())
    }
}

impl TableNames {
    pub fn name(&self, table: ChangeTable) -> &str {
        match table {
            ChangeTable::Messages => &self.messages,
            ChangeTable::ConversationStates => &self.conversation_states,
            ChangeTable::Notifications => &self.notifications,
        }
    }

    pub fn table(&self, name: &str) -> Option<ChangeTable> {
        [
            ChangeTable::Messages,
            ChangeTable::ConversationStates,
            ChangeTable::Notifications,
        ]
        .into_iter()
        .find(|t| self.name(*t) == name)
    }
}

/// Channel topic a subscription joins.
pub fn channel_name(topic: &Topic) -> String {
    match topic {
        Topic::Messages { platform } => format!("realtime:messages:{platform}"),
        Topic::ConversationState {
            platform,
            user_identifier,
        } => format!("realtime:conversation_states:{platform}:{user_identifier}"),
        Topic::Notifications => "realtime:notifications".to_string(),
    }
}

/// Server-side row filter for `topic`, if any.
pub fn row_filter(topic: &Topic) -> Option<String> {
    match topic {
        Topic::Messages { platform } => Some(format!("platform=eq.{platform}")),
        Topic::ConversationState {
            user_identifier, ..
        } => Some(format!("user_identifier=eq.{user_identifier}")),
        Topic::Notifications => None,
    }
}

pub fn join(
    topic: &Topic,
    tables: &TableNames,
    access_token: Option<&str>,
    reference: String,
) -> Frame {
    let mut change = json!({
        "event": "*",
        "schema": tables.schema,
        "table": tables.name(topic.table()),
    });
    if let Some(filter) = row_filter(topic) {
        change["filter"] = Value::String(filter);
    }

    let mut payload = json!({
        "config": {
            "broadcast": {"self": false},
            "presence": {"key": ""},
            "postgres_changes": [change],
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }

    Frame {
        topic: channel_name(topic),
        event: PHX_JOIN.to_string(),
        payload,
        reference: Some(reference),
    }
}

pub fn leave(channel: &str, reference: String) -> Frame {
    Frame {
        topic: channel.to_string(),
        event: PHX_LEAVE.to_string(),
        payload: json!({}),
        reference: Some(reference),
    }
}

pub fn heartbeat(reference: String) -> Frame {
    Frame {
        topic: PHOENIX_TOPIC.to_string(),
        event: HEARTBEAT.to_string(),
        payload: json!({}),
        reference: Some(reference),
    }
}

/// Decodes a `postgres_changes` frame into a [`ChangeEvent`].
///
/// Returns `Ok(None)` for every other event. Deletes carry only the old row,
/// which becomes the event's record.
pub fn decode_change(
    frame: &Frame,
    tables: &TableNames,
) -> Result<Option<ChangeEvent>, ConvsyncError> {
    if frame.event != POSTGRES_CHANGES {
        return Ok(None);
    }
    let data = frame
        .payload
        .get("data")
        .ok_or_else(|| ConvsyncError::Decode("postgres_changes frame without data".into()))?;

    let table_name = data.get("table").and_then(Value::as_str).unwrap_or_default();
    let table = tables.table(table_name).ok_or_else(|| {
        ConvsyncError::Decode(format!("change for unwatched table `{table_name}`"))
    })?;

    let kind_name = data
        .get("type")
        .or_else(|| data.get("eventType"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let kind: ChangeKind = kind_name
        .parse()
        .map_err(|_| ConvsyncError::Decode(format!("unknown change type `{kind_name}`")))?;

    let old_record = data
        .get("old_record")
        .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
        .cloned();
    let record = match data.get("record") {
        Some(record) if !record.is_null() => record.clone(),
        _ => old_record.clone().unwrap_or_default(),
    };

    Ok(Some(ChangeEvent {
        table,
        kind,
        record,
        old_record,
        commit_timestamp: data.get("commit_timestamp").and_then(parse_timestamp),
    }))
}
