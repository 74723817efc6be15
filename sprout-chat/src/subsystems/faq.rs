//! FAQ suggestion engine
//!
//! Quick-reply prompts are loaded once per chat open. They are shown only
//! while the assistant handles the conversation: before the first user
//! message, and again a short while after a bot answer that did not
//! escalate. Picking one only fills the draft; it is sent like typed text.

use sprout_core::models::{FaqAnswer, FaqPrompt, SessionStatus};
use tokio::time::{Duration, Instant};

/// Visibility rule for the suggestion list.
pub fn is_visible(status: SessionStatus, has_user_message: bool, reshow_due: bool) -> bool {
    status == SessionStatus::Bot && (!has_user_message || reshow_due)
}

/// Tracks the delayed re-display after a non-escalated bot answer.
#[derive(Debug, Clone)]
pub struct FaqGate {
    delay: Duration,
    reshow_at: Option<Instant>,
}

impl FaqGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            reshow_at: None,
        }
    }

    pub fn hide(&mut self) {
        self.reshow_at = None;
    }

    /// Returns the instant at which the suggestions come back.
    pub fn schedule_reshow(&mut self, now: Instant) -> Instant {
        let at = now + self.delay;
        self.reshow_at = Some(at);
        at
    }

    /// Suggestions are due right away.
    pub fn show_now(&mut self, now: Instant) {
        self.reshow_at = Some(now);
    }

    pub fn reshow_due(&self, now: Instant) -> bool {
        self.reshow_at.is_some_and(|at| now >= at)
    }

    pub fn reshow_at(&self) -> Option<Instant> {
        self.reshow_at
    }
}

/// What selecting a prompt asks the view to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaqSelection {
    /// Put this text in the outgoing-message field.
    Draft(String),
    /// Navigate to the ticket list instead of chatting.
    OpenTickets,
}

#[derive(Debug, Clone, Default)]
pub struct FaqCatalog {
    prompts: Vec<FaqPrompt>,
}

impl FaqCatalog {
    pub fn new(prompts: Vec<FaqPrompt>) -> Self {
        Self { prompts }
    }

    pub fn prompts(&self) -> &[FaqPrompt] {
        &self.prompts
    }

    pub fn select(&self, index: usize) -> Option<FaqSelection> {
        let prompt = self.prompts.get(index)?;
        Some(match prompt.answer {
            FaqAnswer::Text(_) => FaqSelection::Draft(prompt.question.clone()),
            FaqAnswer::OpenTickets => FaqSelection::OpenTickets,
        })
    }

    /// Look a prompt up by its question, ignoring case and surrounding space.
    pub fn find(&self, question: &str) -> Option<&FaqPrompt> {
        let needle = question.trim().to_lowercase();
        self.prompts
            .iter()
            .find(|p| p.question.trim().to_lowercase() == needle)
    }
}
