//! Chat client — one support-chat view and everything it keeps in memory
//!
//! Control flow on open: identity -> initial load (session + FAQs) -> seed the
//! state machine -> start the poller. Each poll merges messages and checks the
//! session status. All state sits behind one lock that is never held across
//! an await; network calls happen between two short critical sections.
//!
//! Every open or close bumps the view epoch. A response that comes back under
//! an older epoch belongs to a torn-down view and is dropped.

use futures::FutureExt;
use sprout_core::models::{
    Agent, ConversationIdentity, FaqPrompt, Message, SendRequest, SessionStatus,
};
use sprout_core::store::{KeyValueStore, LAUNCHER_DISMISSED_KEY};
use sprout_core::{
    fetch_session_with_retry, ChatConfig, ChatTransport, FileStore, HttpChatTransport,
    SproutConfig, SproutError, TransportError,
};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use crate::subsystems::faq::{FaqCatalog, FaqSelection};
use crate::subsystems::identity::IdentityResolver;
use crate::subsystems::poller::PollScheduler;
use crate::subsystems::reconcile::{Confirmation, MessageLog};
use crate::subsystems::session::{SessionMachine, StatusChange};

const EVENT_CAPACITY: usize = 64;

// ============================================================================
// PUBLIC TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Chat view is not open")]
    NotOpen,

    #[error("Conversation is closed")]
    SessionClosed,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Could not load chat session: {0}")]
    Load(#[from] TransportError),
}

/// Notifications for the view layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    StatusChanged(StatusChange),
    MessagesAppended(Vec<Message>),
    SendFailed { correlation: Uuid, reason: String },
    /// FAQ suggestions became visible again after a bot answer.
    SuggestionsReady,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Applied {
        appended: usize,
        status_change: Option<StatusChange>,
    },
    /// Network or service error; the next tick tries again.
    TransportFailed,
    /// Response did not have the expected shape; state left untouched.
    Malformed,
    /// Response arrived for a view that was closed or reopened meanwhile,
    /// or for a session other than the one on screen.
    Discarded,
    NotOpen,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Delivered {
        message_id: i64,
        escalated: bool,
        reply: Option<Message>,
    },
    /// The message stays on screen marked as failed; sending again is a new
    /// message.
    Failed { correlation: Uuid, reason: String },
}

/// Everything a view needs to render.
#[derive(Debug, Clone, Default)]
pub struct ChatSnapshot {
    pub open: bool,
    pub identity: Option<ConversationIdentity>,
    pub session_id: Option<i64>,
    pub status: Option<SessionStatus>,
    pub agent: Option<Agent>,
    pub banner: Option<String>,
    pub messages: Vec<Message>,
    pub faq_visible: bool,
    pub suggestions: Vec<FaqPrompt>,
    pub draft: String,
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Default)]
struct ViewState {
    epoch: u64,
    open: bool,
    identity: Option<ConversationIdentity>,
    machine: Option<SessionMachine>,
    log: MessageLog,
    faqs: FaqCatalog,
    draft: String,
}

impl ViewState {
    fn faq_visible(&self, now: Instant) -> bool {
        self.open
            && self
                .machine
                .as_ref()
                .is_some_and(|m| m.faq_visible(self.log.has_user_message(), now))
    }

    fn tear_down(&mut self) {
        self.epoch += 1;
        self.open = false;
        self.machine = None;
        self.log = MessageLog::new();
        self.faqs = FaqCatalog::default();
        self.draft.clear();
    }
}

struct Inner {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn KeyValueStore>,
    resolver: IdentityResolver,
    config: ChatConfig,
    state: Mutex<ViewState>,
    poller: Mutex<PollScheduler>,
    events: broadcast::Sender<ChatEvent>,
}

#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

// ============================================================================
// PUBLIC API
// ============================================================================

impl ChatClient {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn KeyValueStore>,
        config: ChatConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                transport,
                resolver: IdentityResolver::new(store.clone()),
                store,
                poller: Mutex::new(PollScheduler::new(config.poll_interval())),
                config,
                state: Mutex::new(ViewState::default()),
                events,
            }),
        }
    }

    /// Build a client talking HTTP to `service.base_url`, with the guest
    /// token kept in `storage.path`.
    pub fn from_config(config: &SproutConfig) -> Result<Self, SproutError> {
        let transport = HttpChatTransport::new(&config.service)?;
        let store = FileStore::open(&config.storage.path);
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(store),
            config.chat.clone(),
        ))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.events.subscribe()
    }

    /// Open the chat view: resolve identity, load session and FAQs, start
    /// polling. `authenticated` is the signed-in user id, if any.
    pub async fn open(&self, authenticated: Option<&str>) -> Result<ChatSnapshot, ChatError> {
        self.stop_polling();
        let epoch = {
            let mut state = self.state();
            state.tear_down();
            state.epoch
        };

        let identity = self.inner.resolver.resolve(authenticated);
        let config = &self.inner.config;

        let (snapshot, faqs) = futures::join!(
            fetch_session_with_retry(
                self.inner.transport.as_ref(),
                &identity,
                config.initial_load_retries,
                config.retry_delay_ms,
            ),
            self.inner.transport.fetch_faqs()
        );
        let snapshot = snapshot?;
        let faqs = faqs.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "FAQ prompts unavailable; chat opens without suggestions");
            Vec::new()
        });

        {
            let mut guard = self.state();
            let state = &mut *guard;
            if state.epoch != epoch {
                tracing::debug!("Chat view was closed while loading");
                return Err(ChatError::NotOpen);
            }

            let messages: Vec<Message> = snapshot.messages.into_iter().map(Message::from).collect();
            state.log.merge_incoming(&messages);
            let mut machine = SessionMachine::new(&snapshot.session, config.faq_reshow_delay());
            machine.resume_history(state.log.last_sender(), Instant::now());
            state.machine = Some(machine);
            state.faqs = FaqCatalog::new(faqs);
            state.identity = Some(identity);
            state.open = true;

            tracing::info!(
                session_id = snapshot.session.id,
                status = ?snapshot.session.status,
                messages = state.log.len(),
                "Chat view opened"
            );
        }

        self.start_polling();
        Ok(self.snapshot())
    }

    /// Close the chat view. A refresh or send already in flight completes
    /// on the server but its response no longer touches the view.
    pub fn close(&self) {
        self.stop_polling();
        let mut state = self.state();
        if state.open {
            tracing::info!("Chat view closed");
        }
        state.tear_down();
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn is_polling(&self) -> bool {
        self.poller().is_running()
    }

    /// One silent refresh: fetch, merge, check status.
    pub async fn poll_once(&self) -> PollOutcome {
        let (epoch, identity) = {
            let state = self.state();
            match (&state.identity, state.open) {
                (Some(identity), true) => (state.epoch, identity.clone()),
                _ => return PollOutcome::NotOpen,
            }
        };

        let snapshot = match self.inner.transport.fetch_session(&identity).await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_malformed() => {
                tracing::warn!(error = %e, "Ignoring malformed poll response");
                return PollOutcome::Malformed;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Poll failed; will retry on next tick");
                return PollOutcome::TransportFailed;
            }
        };

        let (appended, status_change) = {
            let mut guard = self.state();
            let state = &mut *guard;
            if !state.open || state.epoch != epoch {
                tracing::debug!("Dropping poll response for a closed view");
                return PollOutcome::Discarded;
            }
            let Some(machine) = state.machine.as_mut() else {
                return PollOutcome::Discarded;
            };
            if snapshot.session.id != machine.session_id() {
                tracing::info!(
                    shown = machine.session_id(),
                    reported = snapshot.session.id,
                    "Service reports a different session; reopen the chat to follow it"
                );
                return PollOutcome::Discarded;
            }

            let incoming: Vec<Message> = snapshot.messages.into_iter().map(Message::from).collect();
            let appended = state.log.merge_incoming(&incoming);
            let change = machine.observe(&snapshot.session);
            (appended, change)
        };

        let count = appended.len();
        if !appended.is_empty() {
            self.emit(ChatEvent::MessagesAppended(appended));
        }
        if let Some(ref change) = status_change {
            self.emit(ChatEvent::StatusChanged(change.clone()));
        }

        PollOutcome::Applied {
            appended: count,
            status_change,
        }
    }

    /// Send a user message.
    ///
    /// The message is appended before the network call starts. The result
    /// either confirms it (and carries a bot answer, if any) or marks it
    /// failed; a failed send is never retried automatically.
    pub async fn send(&self, body: &str) -> Result<SendOutcome, ChatError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let (epoch, correlation, request, pending) = {
            let mut guard = self.state();
            let state = &mut *guard;
            if !state.open {
                return Err(ChatError::NotOpen);
            }
            let (Some(identity), Some(machine)) = (state.identity.as_ref(), state.machine.as_mut())
            else {
                return Err(ChatError::NotOpen);
            };
            if machine.status() == SessionStatus::Closed {
                return Err(ChatError::SessionClosed);
            }

            let correlation = state.log.push_pending(&self.inner.config.user_label, body);
            machine.note_user_message();

            let request = SendRequest {
                identity: identity.key.clone(),
                session_id: machine.session_id(),
                body: body.to_string(),
                guest: identity.is_guest(),
            };
            let pending = state.log.messages().last().cloned();
            (state.epoch, correlation, request, pending)
        };

        if let Some(pending) = pending {
            self.emit(ChatEvent::MessagesAppended(vec![pending]));
        }

        let result = self.inner.transport.send_message(&request).await;

        let mut events = Vec::new();
        let mut reshow_at = None;
        let outcome = {
            let mut guard = self.state();
            let state = &mut *guard;
            let current = state.open && state.epoch == epoch;

            match result {
                Ok(response) if !current => {
                    tracing::debug!(
                        message_id = response.message_id,
                        "Send confirmed after the view was closed"
                    );
                    SendOutcome::Delivered {
                        message_id: response.message_id,
                        escalated: response.escalated,
                        reply: None,
                    }
                }
                Ok(response) => {
                    if state.log.confirm(correlation, response.message_id)
                        == Confirmation::AlreadyDelivered
                    {
                        tracing::debug!(
                            message_id = response.message_id,
                            "Poll delivered the message before the send returned"
                        );
                    }

                    let reply = response.bot_reply.as_ref().and_then(|r| {
                        state
                            .log
                            .append_reply(r.id, &self.inner.config.assistant_name, &r.text)
                    });
                    if let Some(ref reply) = reply {
                        events.push(ChatEvent::MessagesAppended(vec![reply.clone()]));
                    }

                    if let Some(machine) = state.machine.as_mut() {
                        let change = machine.record_send_outcome(
                            response.escalated,
                            response.bot_reply.is_some(),
                            Instant::now(),
                        );
                        if let Some(change) = change {
                            events.push(ChatEvent::StatusChanged(change));
                        }
                        reshow_at = machine.faq_reshow_at();
                    }

                    SendOutcome::Delivered {
                        message_id: response.message_id,
                        escalated: response.escalated,
                        reply,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, correlation = %correlation, "Failed to send chat message");
                    if current {
                        state.log.mark_failed(correlation);
                        events.push(ChatEvent::SendFailed {
                            correlation,
                            reason: e.to_string(),
                        });
                    }
                    SendOutcome::Failed {
                        correlation,
                        reason: e.to_string(),
                    }
                }
            }
        };

        for event in events {
            self.emit(event);
        }
        if let Some(at) = reshow_at {
            self.announce_suggestions_at(epoch, at);
        }

        Ok(outcome)
    }

    /// Send whatever is in the draft field, clearing it on acceptance.
    pub async fn send_draft(&self) -> Result<SendOutcome, ChatError> {
        let draft = std::mem::take(&mut self.state().draft);
        match self.send(&draft).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let mut state = self.state();
                if state.draft.is_empty() {
                    state.draft = draft;
                }
                Err(e)
            }
        }
    }

    /// Pick a FAQ prompt. A text prompt goes into the draft, exactly as if
    /// typed; nothing is sent.
    pub fn select_faq(&self, index: usize) -> Option<FaqSelection> {
        let mut state = self.state();
        let selection = state.faqs.select(index)?;
        if let FaqSelection::Draft(ref question) = selection {
            state.draft = question.clone();
        }
        Some(selection)
    }

    pub fn set_draft(&self, text: &str) {
        self.state().draft = text.to_string();
    }

    pub fn draft(&self) -> String {
        self.state().draft.clone()
    }

    pub fn faq_visible(&self) -> bool {
        self.state().faq_visible(Instant::now())
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        let state = self.state();
        let faq_visible = state.faq_visible(Instant::now());
        let machine = state.machine.as_ref();

        ChatSnapshot {
            open: state.open,
            identity: state.identity.clone(),
            session_id: machine.map(|m| m.session_id()),
            status: machine.map(|m| m.status()),
            agent: machine.and_then(|m| m.agent().cloned()),
            banner: machine.and_then(|m| m.banner()),
            messages: state.log.messages().to_vec(),
            faq_visible,
            suggestions: if faq_visible {
                state.faqs.prompts().to_vec()
            } else {
                Vec::new()
            },
            draft: state.draft.clone(),
        }
    }

    /// Remember that the visitor dismissed the chat launcher. Storage
    /// failures are logged and otherwise ignored.
    pub fn dismiss_launcher(&self) {
        if let Err(e) = self.inner.store.set(LAUNCHER_DISMISSED_KEY, "true") {
            tracing::warn!(error = %e, "Could not persist launcher dismissal");
        }
    }

    pub fn launcher_dismissed(&self) -> bool {
        match self.inner.store.get(LAUNCHER_DISMISSED_KEY) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read launcher dismissal");
                false
            }
        }
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

impl ChatClient {
    fn state(&self) -> MutexGuard<'_, ViewState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn poller(&self) -> MutexGuard<'_, PollScheduler> {
        self.inner
            .poller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn start_polling(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.poller().start(move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    ChatClient { inner }.poll_once().await;
                }
            }
            .boxed()
        });
    }

    fn stop_polling(&self) {
        self.poller().stop();
    }

    fn announce_suggestions_at(&self, epoch: u64, at: Instant) {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let client = ChatClient { inner };
            let visible = {
                let state = client.state();
                state.epoch == epoch && state.faq_visible(Instant::now())
            };
            if visible {
                client.emit(ChatEvent::SuggestionsReady);
            }
        });
    }
}
