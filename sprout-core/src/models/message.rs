use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    User,
    Bot,
    Agent,
}

/// Either the server-issued id or the correlation id of a local send that
/// has not been confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    Confirmed(i64),
    Local(Uuid),
}

impl MessageId {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MessageId::Confirmed(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Confirmed(id) => write!(f, "{}", id),
            MessageId::Local(id) => write!(f, "local:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Sending,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender: SenderKind,
    pub sender_label: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub delivery: DeliveryState,
}

impl Message {
    /// A user message shown before the server has acknowledged it.
    pub fn pending(correlation: Uuid, label: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: MessageId::Local(correlation),
            sender: SenderKind::User,
            sender_label: label.into(),
            body: body.into(),
            created_at: Utc::now(),
            read: true,
            delivery: DeliveryState::Sending,
        }
    }

    pub fn confirmed_id(&self) -> Option<i64> {
        match self.id {
            MessageId::Confirmed(id) => Some(id),
            MessageId::Local(_) => None,
        }
    }
}

/// Message as the chat service sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: i64,
    pub sender: SenderKind,
    pub sender_label: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl From<WireMessage> for Message {
    fn from(w: WireMessage) -> Self {
        Self {
            id: MessageId::Confirmed(w.id),
            sender: w.sender,
            sender_label: w.sender_label,
            body: w.body,
            created_at: w.created_at,
            read: w.read,
            delivery: DeliveryState::Delivered,
        }
    }
}
