use serde::{Deserialize, Serialize};

use super::message::WireMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Bot,
    Waiting,
    Active,
    Closed,
}

impl SessionStatus {
    /// Position along Bot -> Waiting -> Active -> Closed.
    pub fn rank(self) -> u8 {
        match self {
            SessionStatus::Bot => 0,
            SessionStatus::Waiting => 1,
            SessionStatus::Active => 2,
            SessionStatus::Closed => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    #[serde(rename = "name")]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: i64,
    pub status: SessionStatus,
    #[serde(default)]
    pub assigned_agent: Option<Agent>,
}

impl ChatSession {
    /// Drops an agent reported alongside any status other than Active.
    pub fn normalized(mut self) -> Self {
        if self.status != SessionStatus::Active && self.assigned_agent.is_some() {
            tracing::warn!(
                session_id = self.id,
                status = ?self.status,
                "Ignoring assigned agent on a session that is not active"
            );
            self.assigned_agent = None;
        }
        self
    }
}

/// Response of `GET session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: ChatSession,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

/// Body of `POST send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub identity: String,
    pub session_id: i64,
    pub body: String,
    pub guest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotReply {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub message_id: i64,
    #[serde(default)]
    pub escalated: bool,
    #[serde(default)]
    pub bot_reply: Option<BotReply>,
}
