// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maps raw wire records onto the canonical [`Message`].
//!
//! The backend, the push service and the offline fixtures all disagree on field
//! names, so every logical field is looked up through an ordered alias list.
//! Direction and sender role are inferred by a small rules engine: an ordered
//! list of named rules evaluated first-match, so the priority order can be
//! audited through [`attribute`].

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use strum::Display;
use tracing::{debug, trace};

use convsync_core::time::parse_timestamp;
use convsync_core::types::canonical_contact;
use convsync_core::{
    ConversationKey, Direction, Message, MessageStatus, MessageType, Platform, SenderRole,
};

const CONTENT_FIELDS: &[&str] = &["content", "text", "body", "message", "caption"];
const TIMESTAMP_FIELDS: &[&str] = &[
    "timestamp",
    "created_at",
    "date",
    "sent_at",
    "inserted_at",
    "createdAt",
];
const ID_FIELDS: &[&str] = &["id", "message_id", "wamid", "_id"];
const CONTACT_FIELDS: &[&str] = &["contact_id", "contactId", "phone_number", "user_identifier"];
const CONVERSATION_FIELDS: &[&str] = &["conversation_id", "conversationId", "chat_id"];
const TYPE_FIELDS: &[&str] = &["message_type", "type", "media_type"];
const STATUS_FIELDS: &[&str] = &["status", "delivery_status"];

const CONTACT_FLAG_FIELDS: &[&str] = &["is_from_contact", "isFromContact", "from_contact"];
const FROM_ME_FIELDS: &[&str] = &["from_me", "fromMe"];
const SENT_BY_FIELDS: &[&str] = &["sent_by_user", "sent_by", "sender_name", "sender_type"];
const AI_FLAG_FIELDS: &[&str] = &["is_ai_response", "is_ai", "ai_generated"];
const ROLE_FIELDS: &[&str] = &["from", "sender", "role", "sender_role"];

/// Words in a "sent by" label that mark an automated sender.
const AUTOMATED_TOKENS: &[&str] = &[
    "ai",
    "ia",
    "bot",
    "chatbot",
    "asistente",
    "assistant",
    "gpt",
    "automated",
];

/// Length of the digest prefix used in synthetic ids.
const SYNTHETIC_ID_HEX_LEN: usize = 16;

/// Named direction/role inference rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AttributionRule {
    /// An explicit "is from the external contact" flag.
    ContactFlag,
    /// `from_me`, direction strings, role strings and identity matching.
    Legacy,
    /// Nothing matched: outgoing, sent by an agent.
    Default,
}

/// The sender role inferred for a record and the rule that decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribution {
    pub rule: AttributionRule,
    pub sender_role: SenderRole,
}

impl Attribution {
    pub fn direction(&self) -> Direction {
        self.sender_role.direction()
    }
}

type Rule = fn(&Map<String, Value>, &ConversationKey) -> Option<SenderRole>;

const RULES: &[(AttributionRule, Rule)] = &[
    (AttributionRule::ContactFlag, contact_flag_rule),
    (AttributionRule::Legacy, legacy_rule),
    (AttributionRule::Default, default_rule),
];

/// Runs the attribution rules over `record`, first match wins.
pub fn attribute(record: &Map<String, Value>, key: &ConversationKey) -> Attribution {
    RULES
        .iter()
        .find_map(|(rule, apply)| {
            apply(record, key).map(|sender_role| Attribution {
                rule: *rule,
                sender_role,
            })
        })
        .unwrap_or(Attribution {
            rule: AttributionRule::Default,
            sender_role: SenderRole::Agent,
        })
}

fn contact_flag_rule(record: &Map<String, Value>, _key: &ConversationKey) -> Option<SenderRole> {
    flag(record, CONTACT_FLAG_FIELDS).map(|from_contact| {
        if from_contact {
            SenderRole::Client
        } else {
            outgoing_role(record)
        }
    })
}

fn legacy_rule(record: &Map<String, Value>, key: &ConversationKey) -> Option<SenderRole> {
    if let Some(from_me) = flag(record, FROM_ME_FIELDS) {
        return Some(if from_me {
            outgoing_role(record)
        } else {
            SenderRole::Client
        });
    }

    if let Some(direction) = record
        .get("direction")
        .and_then(Value::as_str)
        .and_then(|s| Direction::from_str(s.trim()).ok())
    {
        return Some(match direction {
            Direction::Incoming => SenderRole::Client,
            Direction::Outgoing => outgoing_role(record),
        });
    }

    for field in ROLE_FIELDS {
        let Some(role) = record.get(*field).and_then(Value::as_str) else {
            continue;
        };
        match role.trim().to_ascii_lowercase().as_str() {
            "ai" | "bot" | "assistant" => return Some(SenderRole::Ai),
            "business" | "agent" | "system" => return Some(outgoing_role(record)),
            "contact" | "client" | "customer" | "user" => return Some(SenderRole::Client),
            _ => {}
        }
    }

    if scalar(record, "from").is_some_and(|from| key.matches(&from)) {
        return Some(SenderRole::Client);
    }
    if scalar(record, "to").is_some_and(|to| key.matches(&to)) {
        return Some(outgoing_role(record));
    }

    (ai_flag(record) == Some(true)).then_some(SenderRole::Ai)
}

fn default_rule(_record: &Map<String, Value>, _key: &ConversationKey) -> Option<SenderRole> {
    Some(SenderRole::Agent)
}

/// Splits business-side senders into automated and human.
fn outgoing_role(record: &Map<String, Value>) -> SenderRole {
    let labelled_automated = SENT_BY_FIELDS
        .iter()
        .filter_map(|field| record.get(*field).and_then(Value::as_str))
        .any(names_automated_sender);

    if labelled_automated || ai_flag(record) == Some(true) {
        SenderRole::Ai
    } else {
        SenderRole::Agent
    }
}

fn names_automated_sender(label: &str) -> bool {
    label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| AUTOMATED_TOKENS.contains(&token.to_lowercase().as_str()))
}

/// AI flag at the top level or inside a nested `metadata` object.
fn ai_flag(record: &Map<String, Value>) -> Option<bool> {
    flag(record, AI_FLAG_FIELDS).or_else(|| {
        record
            .get("metadata")
            .and_then(Value::as_object)
            .and_then(|nested| flag(nested, AI_FLAG_FIELDS))
    })
}

fn flag(record: &Map<String, Value>, fields: &[&str]) -> Option<bool> {
    fields
        .iter()
        .find_map(|field| record.get(*field).and_then(as_flag))
}

/// Booleans arrive as `true`, `"true"`, `1` or `"1"`.
fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn scalar(record: &Map<String, Value>, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_scalar(
    record: &Map<String, Value>,
    fields: &[&'static str],
) -> Option<(&'static str, String)> {
    fields
        .iter()
        .find_map(|field| scalar(record, field).map(|value| (*field, value)))
}

fn first_parsed<T: FromStr>(
    record: &Map<String, Value>,
    fields: &[&'static str],
) -> Option<(&'static str, T)> {
    fields.iter().find_map(|field| {
        let raw = record.get(*field)?.as_str()?;
        T::from_str(raw.trim()).ok().map(|value| (*field, value))
    })
}

/// Content is a string, or an object carrying the string under `body`.
fn content_of(record: &Map<String, Value>) -> Option<(&'static str, String)> {
    CONTENT_FIELDS.iter().find_map(|field| {
        let text = match record.get(*field)? {
            Value::String(s) => s.clone(),
            Value::Object(inner) => inner.get("body")?.as_str()?.to_string(),
            _ => return None,
        };
        (!text.trim().is_empty()).then_some((*field, text))
    })
}

fn timestamp_of(record: &Map<String, Value>) -> Option<(&'static str, DateTime<Utc>)> {
    TIMESTAMP_FIELDS.iter().find_map(|field| {
        record
            .get(*field)
            .and_then(parse_timestamp)
            .map(|ts| (*field, ts))
    })
}

/// Deterministic id for records that carry none, so redeliveries dedupe.
pub fn synthetic_id(timestamp: DateTime<Utc>, content: &str, contact: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true));
    hasher.update(b"|");
    hasher.update(content.as_bytes());
    hasher.update(b"|");
    hasher.update(contact.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("syn-{}", &digest[..SYNTHETIC_ID_HEX_LEN])
}

/// Normalizes one raw record for the conversation identified by `key`.
///
/// Returns `None` when the record is not an object or lacks either non-empty
/// content or a parseable timestamp.
pub fn normalize(record: &Value, key: &ConversationKey) -> Option<Message> {
    let Some(fields) = record.as_object() else {
        trace!("dropping non-object record");
        return None;
    };
    let Some((content_field, content)) = content_of(fields) else {
        trace!(conversation = %key, "dropping record without content");
        return None;
    };
    let Some((timestamp_field, timestamp)) = timestamp_of(fields) else {
        trace!(conversation = %key, "dropping record without a parseable timestamp");
        return None;
    };

    let mut consumed: Vec<&str> = vec![content_field, timestamp_field, "direction", "sender_role"];

    let platform = match first_parsed::<Platform>(fields, &["platform"]) {
        Some((field, platform)) => {
            consumed.push(field);
            platform
        }
        None => key.platform(),
    };

    let contact_id = match first_scalar(fields, CONTACT_FIELDS) {
        Some((field, contact)) => {
            consumed.push(field);
            contact
        }
        None => key.contact_id().to_string(),
    };

    let conversation_id = match first_scalar(fields, CONVERSATION_FIELDS) {
        Some((field, conversation)) => {
            consumed.push(field);
            conversation
        }
        None => key.conversation_id(),
    };

    let id = match first_scalar(fields, ID_FIELDS) {
        Some((field, id)) => {
            consumed.push(field);
            id
        }
        None => synthetic_id(
            timestamp,
            &content,
            &canonical_contact(platform, &contact_id),
        ),
    };

    let message_type = match first_parsed::<MessageType>(fields, TYPE_FIELDS) {
        Some((field, kind)) => {
            consumed.push(field);
            kind
        }
        None => MessageType::default(),
    };

    let status = match first_parsed::<MessageStatus>(fields, STATUS_FIELDS) {
        Some((field, status)) => {
            consumed.push(field);
            status
        }
        None => MessageStatus::default(),
    };

    let attribution = attribute(fields, key);

    let mut metadata = Map::new();
    if let Some(Value::Object(nested)) = fields.get("metadata") {
        consumed.push("metadata");
        metadata.extend(nested.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    for (name, value) in fields {
        if !consumed.contains(&name.as_str()) {
            metadata.insert(name.clone(), value.clone());
        }
    }
    metadata.insert(
        "is_ai_response".to_string(),
        Value::Bool(attribution.sender_role == SenderRole::Ai),
    );

    Some(Message {
        id,
        conversation_id,
        contact_id,
        platform,
        direction: attribution.direction(),
        sender_role: attribution.sender_role,
        content,
        message_type,
        status,
        timestamp,
        metadata,
    })
}

/// Normalizes a batch, dropping records that do not normalize.
pub fn normalize_batch(records: &[Value], key: &ConversationKey) -> Vec<Message> {
    let messages: Vec<Message> = records.iter().filter_map(|r| normalize(r, key)).collect();
    let dropped = records.len() - messages.len();
    if dropped > 0 {
        debug!(conversation = %key, dropped, kept = messages.len(), "dropped unusable records");
    }
    messages
}
