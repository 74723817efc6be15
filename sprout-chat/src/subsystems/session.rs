//! Session state machine
//!
//! Bot -> Waiting -> Active -> Closed, forward only. Every transition comes
//! from a server response: an escalating send moves Bot to Waiting, polls
//! report everything else. A poll reporting an earlier status than the one
//! held is stale and ignored. Leaving Bot hides the FAQ suggestions in the
//! same call that changes the status.

use sprout_core::models::{Agent, ChatSession, SenderKind, SessionStatus};
use tokio::time::{Duration, Instant};

use super::faq::{self, FaqGate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub agent: Option<Agent>,
}

#[derive(Debug, Clone)]
pub struct SessionMachine {
    session_id: i64,
    status: SessionStatus,
    agent: Option<Agent>,
    faq: FaqGate,
}

impl SessionMachine {
    /// Seed from the session returned by the initial load.
    pub fn new(session: &ChatSession, faq_reshow_delay: Duration) -> Self {
        let session = session.clone().normalized();
        Self {
            session_id: session.id,
            status: session.status,
            agent: session.assigned_agent,
            faq: FaqGate::new(faq_reshow_delay),
        }
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn agent(&self) -> Option<&Agent> {
        self.agent.as_ref()
    }

    /// Apply the session reported by a poll.
    pub fn observe(&mut self, session: &ChatSession) -> Option<StatusChange> {
        let session = session.clone().normalized();

        if session.status.rank() < self.status.rank() {
            tracing::debug!(
                session_id = self.session_id,
                held = ?self.status,
                reported = ?session.status,
                "Ignoring stale session status"
            );
            return None;
        }

        if session.status == self.status {
            let reassigned = self.status == SessionStatus::Active
                && session.assigned_agent.is_some()
                && session.assigned_agent != self.agent;
            if !reassigned {
                return None;
            }
        }

        Some(self.transition(session.status, session.assigned_agent))
    }

    /// Apply the outcome of a send call.
    ///
    /// An escalation moves Bot to Waiting. A bot answer that kept the
    /// conversation with the assistant schedules the FAQ re-display.
    pub fn record_send_outcome(
        &mut self,
        escalated: bool,
        bot_replied: bool,
        now: Instant,
    ) -> Option<StatusChange> {
        if escalated {
            if self.status == SessionStatus::Bot {
                return Some(self.transition(SessionStatus::Waiting, None));
            }
            return None;
        }

        if bot_replied && self.status == SessionStatus::Bot {
            self.faq.schedule_reshow(now);
        }
        None
    }

    /// Seed the FAQ gate from loaded history: a conversation still with the
    /// assistant whose last message is a bot answer shows suggestions.
    pub fn resume_history(&mut self, last_sender: Option<SenderKind>, now: Instant) {
        if self.status == SessionStatus::Bot && last_sender == Some(SenderKind::Bot) {
            self.faq.show_now(now);
        }
    }

    /// The user just sent something; suggestions stay hidden until the
    /// next non-escalated answer.
    pub fn note_user_message(&mut self) {
        self.faq.hide();
    }

    pub fn faq_visible(&self, has_user_message: bool, now: Instant) -> bool {
        faq::is_visible(self.status, has_user_message, self.faq.reshow_due(now))
    }

    pub fn faq_reshow_at(&self) -> Option<Instant> {
        match self.status {
            SessionStatus::Bot => self.faq.reshow_at(),
            _ => None,
        }
    }

    /// Status line shown above the conversation.
    pub fn banner(&self) -> Option<String> {
        match self.status {
            SessionStatus::Bot => None,
            SessionStatus::Waiting => Some("Connecting you with a specialist…".to_string()),
            SessionStatus::Active => Some(match &self.agent {
                Some(agent) => format!("{} has joined the chat", agent.display_name),
                None => "A specialist has joined the chat".to_string(),
            }),
            SessionStatus::Closed => Some("This conversation has been closed".to_string()),
        }
    }

    fn transition(&mut self, to: SessionStatus, agent: Option<Agent>) -> StatusChange {
        let from = self.status;
        self.status = to;
        self.agent = agent;

        if to != SessionStatus::Bot {
            self.faq.hide();
        }

        tracing::info!(
            session_id = self.session_id,
            from = ?from,
            to = ?to,
            agent = self.agent.as_ref().map(|a| a.display_name.as_str()),
            "Chat session status changed"
        );

        StatusChange {
            from,
            to,
            agent: self.agent.clone(),
        }
    }
}
