//! Message reconciliation
//!
//! Merges server message lists into the locally held sequence and runs the
//! two-phase optimistic send (pending -> confirmed).
//!
//! Rules:
//! - merge only appends, in incoming order, messages whose id is not held yet
//! - existing entries are never reordered
//! - a pending entry is matched by its correlation id, never by position
//! - a polled user message that matches the oldest pending entry's text
//!   promotes that entry in place instead of being appended
//! - a confirmed id appears at most once

use chrono::Utc;
use sprout_core::models::{DeliveryState, Message, MessageId, SenderKind};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Append every message of `incoming` whose id is absent from `local`.
///
/// Pure; `merge(&merge(l, b), b) == merge(l, b)`.
pub fn merge(local: &[Message], incoming: &[Message]) -> Vec<Message> {
    let mut merged = local.to_vec();
    append_missing(&mut merged, incoming);
    merged
}

fn append_missing(local: &mut Vec<Message>, incoming: &[Message]) -> Vec<Message> {
    let mut seen: HashSet<MessageId> = local.iter().map(|m| m.id).collect();
    let mut appended = Vec::new();

    for msg in incoming {
        if seen.insert(msg.id) {
            local.push(msg.clone());
            appended.push(msg.clone());
        }
    }

    appended
}

/// Result of confirming a pending send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The pending entry now carries the server id.
    Promoted,
    /// A poll already delivered the server copy; the pending entry was
    /// promoted or dropped.
    AlreadyDelivered,
    /// No pending entry with that correlation id.
    Unknown,
}

/// The ordered message sequence of one open chat view.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    /// Pending sends promoted by a poll before their send call returned.
    adopted: HashMap<Uuid, i64>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Merge a fetched batch. Returns the messages that were new.
    pub fn merge_incoming(&mut self, incoming: &[Message]) -> Vec<Message> {
        let fresh: Vec<Message> = incoming
            .iter()
            .filter(|msg| !self.adopt_pending(msg))
            .cloned()
            .collect();
        append_missing(&mut self.messages, &fresh)
    }

    /// Phase one of a send: show the user's text right away.
    pub fn push_pending(&mut self, label: &str, body: &str) -> Uuid {
        let correlation = Uuid::new_v4();
        self.messages.push(Message::pending(correlation, label, body));
        correlation
    }

    /// Phase two of a send: substitute the server id on the pending entry.
    pub fn confirm(&mut self, correlation: Uuid, server_id: i64) -> Confirmation {
        let Some(pos) = self.position(MessageId::Local(correlation)) else {
            return match self.adopted.remove(&correlation) {
                Some(adopted_id) => {
                    if adopted_id != server_id {
                        tracing::debug!(
                            adopted_id,
                            server_id,
                            "Poll matched an identical message from another send"
                        );
                    }
                    Confirmation::AlreadyDelivered
                }
                None => Confirmation::Unknown,
            };
        };

        if self.position(MessageId::Confirmed(server_id)).is_some() {
            self.messages.remove(pos);
            return Confirmation::AlreadyDelivered;
        }

        let entry = &mut self.messages[pos];
        entry.id = MessageId::Confirmed(server_id);
        entry.delivery = DeliveryState::Delivered;
        Confirmation::Promoted
    }

    /// Keep the entry visible but flag it as not delivered.
    pub fn mark_failed(&mut self, correlation: Uuid) -> bool {
        match self.position(MessageId::Local(correlation)) {
            Some(pos) => {
                self.messages[pos].delivery = DeliveryState::Failed;
                true
            }
            None => false,
        }
    }

    /// Append the bot answer carried by a send response unless a poll got
    /// there first.
    pub fn append_reply(&mut self, id: i64, label: &str, text: &str) -> Option<Message> {
        let reply = Message {
            id: MessageId::Confirmed(id),
            sender: SenderKind::Bot,
            sender_label: label.to_string(),
            body: text.to_string(),
            created_at: Utc::now(),
            read: false,
            delivery: DeliveryState::Delivered,
        };
        append_missing(&mut self.messages, std::slice::from_ref(&reply)).pop()
    }

    pub fn last_sender(&self) -> Option<SenderKind> {
        self.messages.last().map(|m| m.sender)
    }

    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.sender == SenderKind::User)
    }

    pub fn pending_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.delivery == DeliveryState::Sending)
            .count()
    }

    /// Promote the oldest pending entry with the same text to the server
    /// copy `msg`. Returns false when `msg` is not such a copy.
    fn adopt_pending(&mut self, msg: &Message) -> bool {
        let Some(server_id) = msg.confirmed_id() else {
            return false;
        };
        if msg.sender != SenderKind::User || self.position(msg.id).is_some() {
            return false;
        }

        let Some(entry) = self
            .messages
            .iter_mut()
            .find(|m| m.delivery == DeliveryState::Sending && m.body == msg.body)
        else {
            return false;
        };
        let MessageId::Local(correlation) = entry.id else {
            return false;
        };

        entry.id = msg.id;
        entry.created_at = msg.created_at;
        entry.delivery = DeliveryState::Delivered;
        self.adopted.insert(correlation, server_id);
        true
    }

    fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }
}
