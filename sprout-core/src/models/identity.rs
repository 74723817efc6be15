use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Authenticated,
    Guest,
}

/// The key a conversation is filed under on the chat service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationIdentity {
    pub kind: IdentityKind,
    pub key: String,
    /// False when the guest token could not be written to the store; the
    /// conversation will not resume after a reload.
    pub persisted: bool,
    /// Guest token left behind when an authenticated identity took over.
    pub previous_guest: Option<String>,
}

impl ConversationIdentity {
    pub fn authenticated(user_id: impl Into<String>, previous_guest: Option<String>) -> Self {
        Self {
            kind: IdentityKind::Authenticated,
            key: user_id.into(),
            persisted: true,
            previous_guest,
        }
    }

    pub fn guest(token: impl Into<String>, persisted: bool) -> Self {
        Self {
            kind: IdentityKind::Guest,
            key: token.into(),
            persisted,
            previous_guest: None,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.kind == IdentityKind::Guest
    }
}
