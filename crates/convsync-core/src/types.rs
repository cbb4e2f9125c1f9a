// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the backend, transport and synchronization crates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter plugged into a conversation session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Backend,
    Transport,
}

// --- Message enums ---

/// Messaging platform a conversation lives on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Whatsapp,
    Instagram,
    Messenger,
    Facebook,
}

/// Whether a message came from the external contact or from the business side.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Who authored a message. `Client` is the only role of incoming messages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Client,
    Ai,
    Agent,
}

impl SenderRole {
    /// The direction implied by this role.
    pub fn direction(self) -> Direction {
        match self {
            SenderRole::Client => Direction::Incoming,
            SenderRole::Ai | SenderRole::Agent => Direction::Outgoing,
        }
    }
}

/// Content kind of a message.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Audio,
    Document,
}

/// Delivery status of a message.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

// --- Canonical message ---

/// A message in canonical form, regardless of which wire shape it arrived in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub contact_id: String,
    pub platform: Platform,
    pub direction: Direction,
    pub sender_role: SenderRole,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
    /// Source-specific extras. Always carries `is_ai_response`.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Message {
    /// True when `sender_role == client` exactly when `direction == incoming`.
    pub fn is_consistent(&self) -> bool {
        self.sender_role.direction() == self.direction
    }

    /// Value of the `is_ai_response` metadata flag.
    pub fn is_ai_response(&self) -> bool {
        self.metadata
            .get("is_ai_response")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

// --- Conversation identity ---

/// Identity of one conversation: a platform plus the external contact.
///
/// `match_key` is the contact in canonical form and is what inbound events are
/// compared against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    platform: Platform,
    contact_id: String,
    match_key: String,
}

impl ConversationKey {
    pub fn new(platform: Platform, contact_id: impl Into<String>) -> Self {
        let contact_id = contact_id.into().trim().to_string();
        let match_key = canonical_contact(platform, &contact_id);
        Self {
            platform,
            contact_id,
            match_key,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The contact identifier as supplied by the caller, used in REST paths.
    pub fn contact_id(&self) -> &str {
        &self.contact_id
    }

    pub fn match_key(&self) -> &str {
        &self.match_key
    }

    /// Conversation id used when a wire record does not carry one.
    pub fn conversation_id(&self) -> String {
        format!("{}:{}", self.platform, self.match_key)
    }

    /// Whether `candidate` names the same contact once canonicalized.
    pub fn matches(&self, candidate: &str) -> bool {
        !candidate.trim().is_empty()
            && canonical_contact(self.platform, candidate) == self.match_key
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.match_key)
    }
}

/// Canonicalizes a contact identifier for `platform`.
///
/// WhatsApp contacts are phone numbers: separators and a `whatsapp:` prefix are
/// dropped, a `00` international prefix becomes `+`, and a leading `+` is
/// enforced. Other platforms use opaque ids, which are only trimmed and
/// lowercased.
pub fn canonical_contact(platform: Platform, raw: &str) -> String {
    let trimmed = raw.trim();
    if platform != Platform::Whatsapp {
        return trimmed.to_lowercase();
    }

    let without_scheme = match trimmed.get(..9) {
        Some(prefix) if prefix.eq_ignore_ascii_case("whatsapp:") => &trimmed[9..],
        _ => trimmed,
    };
    let compact: String = without_scheme
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let digits = if let Some(rest) = compact.strip_prefix('+') {
        rest
    } else if let Some(rest) = compact.strip_prefix("00") {
        rest
    } else {
        compact.as_str()
    };

    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        format!("+{digits}")
    } else {
        trimmed.to_lowercase()
    }
}

// --- Conversation state ---

/// Workflow stage of a conversation. Stages are owned by the backend workflow,
/// so unknown values are kept verbatim in [`ConversationStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConversationStatus {
    MainMenu,
    GeneratingAiOrder,
    HumanAgent,
    ConfirmingAddress,
    OrderCompleted,
    AwaitingPayment,
    GeneralInfo,
    Other(String),
}

impl ConversationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ConversationStatus::MainMenu => "main_menu",
            ConversationStatus::GeneratingAiOrder => "generating_ai_order",
            ConversationStatus::HumanAgent => "human_agent",
            ConversationStatus::ConfirmingAddress => "confirming_address",
            ConversationStatus::OrderCompleted => "order_completed",
            ConversationStatus::AwaitingPayment => "awaiting_payment",
            ConversationStatus::GeneralInfo => "general_info",
            ConversationStatus::Other(s) => s,
        }
    }
}

impl From<String> for ConversationStatus {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "main_menu" => ConversationStatus::MainMenu,
            "generating_ai_order" => ConversationStatus::GeneratingAiOrder,
            "human_agent" => ConversationStatus::HumanAgent,
            "confirming_address" => ConversationStatus::ConfirmingAddress,
            "order_completed" => ConversationStatus::OrderCompleted,
            "awaiting_payment" => ConversationStatus::AwaitingPayment,
            "general_info" => ConversationStatus::GeneralInfo,
            _ => ConversationStatus::Other(s),
        }
    }
}

impl From<ConversationStatus> for String {
    fn from(status: ConversationStatus) -> Self {
        status.as_str().to_string()
    }
}

impl FromStr for ConversationStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ConversationStatus::from(s.to_string()))
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side workflow state of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub platform: Platform,
    pub user_identifier: String,
    pub current_status: ConversationStatus,
    pub previous_status: Option<ConversationStatus>,
    #[serde(default)]
    pub status_data: Map<String, Value>,
    pub last_interaction: Option<DateTime<Utc>>,
}

// --- Notifications ---

/// Category of an operator-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    AgentAssigned,
    OrderStatus,
    System,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::AgentAssigned => "agent_assigned",
            NotificationKind::OrderStatus => "order_status",
            NotificationKind::System => "system",
            NotificationKind::Other(s) => s,
        }
    }
}

impl From<String> for NotificationKind {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "agent_assigned" => NotificationKind::AgentAssigned,
            "order_status" => NotificationKind::OrderStatus,
            "system" => NotificationKind::System,
            _ => NotificationKind::Other(s),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency of a notification.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// An operator-facing alert pushed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// `None` means the notification is a broadcast.
    pub recipient: Option<String>,
    pub priority: Priority,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// --- Push events ---

/// Table a row-level change event was raised on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Messages,
    ConversationStates,
    Notifications,
}

/// Kind of row-level change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change pushed by the realtime service, carrying the full new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub kind: ChangeKind,
    pub record: Value,
    #[serde(default)]
    pub old_record: Option<Value>,
    #[serde(default)]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

/// What a push subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every message change on a platform. Filtered client-side per conversation.
    Messages { platform: Platform },
    /// Workflow state rows for one identifier, filtered server-side.
    ConversationState {
        platform: Platform,
        user_identifier: String,
    },
    /// Every notification change. Filtered client-side by recipient.
    Notifications,
}

impl Topic {
    pub fn table(&self) -> ChangeTable {
        match self {
            Topic::Messages { .. } => ChangeTable::Messages,
            Topic::ConversationState { .. } => ChangeTable::ConversationStates,
            Topic::Notifications => ChangeTable::Notifications,
        }
    }
}

// --- Backend payloads ---

/// Pagination block of a paginated message response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub has_more: bool,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Raw records returned by a REST endpoint, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    pub records: Vec<Value>,
    pub pagination: Option<Pagination>,
}

impl RawBatch {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records,
            pagination: None,
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
