//! End-to-end tests for the chat client
//!
//! Most tests drive `ChatClient` against `FakeChatService`, an in-memory
//! stand-in for the remote chat service whose calls can be held open to
//! simulate a slow network. Timing tests run on tokio's paused clock. The
//! last group goes through the real HTTP transport against wiremock.

use async_trait::async_trait;
use chrono::Utc;
use sprout_chat::{ChatClient, ChatEvent, FaqSelection, PollOutcome, SendOutcome};
use sprout_core::models::{
    Agent, BotReply, ChatSession, ConversationIdentity, DeliveryState, FaqAnswer, FaqPrompt,
    MessageId, SendRequest, SendResponse, SenderKind, SessionSnapshot, SessionStatus, WireMessage,
};
use sprout_core::store::{KeyValueStore, MemoryStore, GUEST_TOKEN_KEY};
use sprout_core::{ChatConfig, ChatTransport, HttpChatTransport, TransportError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Semaphore;

const DELIVERY_QUESTION: &str = "Как работает доставка?";
const DELIVERY_ANSWER: &str = "We deliver by courier within 1-3 days; plants travel in insulated boxes.";

// ===========================================================================
// Fake chat service
// ===========================================================================

struct FakeChatService {
    session: Mutex<ChatSession>,
    messages: Mutex<Vec<WireMessage>>,
    faqs: Vec<FaqPrompt>,
    next_id: AtomicI64,
    fetch_calls: AtomicUsize,
    send_calls: AtomicUsize,
    hold_fetch: Mutex<Option<Arc<Semaphore>>>,
    hold_next_fetch: Mutex<Option<Arc<Semaphore>>>,
    hold_send: Mutex<Option<Arc<Semaphore>>>,
    fail_sends: AtomicBool,
    fail_fetches: AtomicBool,
}

impl FakeChatService {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(ChatSession {
                id: 31,
                status: SessionStatus::Bot,
                assigned_agent: None,
            }),
            messages: Mutex::new(Vec::new()),
            faqs: vec![
                FaqPrompt::text(DELIVERY_QUESTION, DELIVERY_ANSWER),
                FaqPrompt {
                    question: "Where is my order?".to_string(),
                    answer: FaqAnswer::OpenTickets,
                },
            ],
            next_id: AtomicI64::new(100),
            fetch_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            hold_fetch: Mutex::new(None),
            hold_next_fetch: Mutex::new(None),
            hold_send: Mutex::new(None),
            fail_sends: AtomicBool::new(false),
            fail_fetches: AtomicBool::new(false),
        })
    }

    fn set_session(&self, status: SessionStatus, agent: Option<Agent>) {
        let mut session = self.session.lock().unwrap();
        session.status = status;
        session.assigned_agent = agent;
    }

    fn push_message(&self, sender: SenderKind, label: &str, body: &str) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().push(WireMessage {
            id,
            sender,
            sender_label: label.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            read: false,
        });
        id
    }

    /// Make subsequent fetches hang until the returned semaphore gets permits.
    fn hold_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.hold_fetch.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Make only the next fetch hang until the returned semaphore gets a permit.
    fn hold_next_fetch(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.hold_next_fetch.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn hold_sends(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.hold_send.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for FakeChatService {
    async fn fetch_session(
        &self,
        _identity: &ConversationIdentity,
    ) -> Result<SessionSnapshot, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let snapshot = SessionSnapshot {
            session: self.session.lock().unwrap().clone(),
            messages: self.messages.lock().unwrap().clone(),
        };

        let gate = self.hold_fetch.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
        let once = self.hold_next_fetch.lock().unwrap().take();
        if let Some(gate) = once {
            let _permit = gate.acquire().await;
        }

        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(TransportError::Api {
                code: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(snapshot)
    }

    async fn fetch_faqs(&self) -> Result<Vec<FaqPrompt>, TransportError> {
        Ok(self.faqs.clone())
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendResponse, TransportError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Api {
                code: 502,
                message: "bad gateway".to_string(),
            });
        }

        let message_id = self.push_message(SenderKind::User, "Visitor", &request.body);

        let canned = self.faqs.iter().find_map(|p| match &p.answer {
            FaqAnswer::Text(answer) if p.question == request.body => Some(answer.clone()),
            _ => None,
        });

        let status = self.session.lock().unwrap().status;
        let response = match (status, canned) {
            (SessionStatus::Bot, Some(answer)) => {
                let reply_id = self.push_message(SenderKind::Bot, "Fern", &answer);
                SendResponse {
                    message_id,
                    escalated: false,
                    bot_reply: Some(BotReply {
                        id: reply_id,
                        text: answer,
                    }),
                }
            }
            (SessionStatus::Bot, None) => {
                self.set_session(SessionStatus::Waiting, None);
                SendResponse {
                    message_id,
                    escalated: true,
                    bot_reply: None,
                }
            }
            _ => SendResponse {
                message_id,
                escalated: false,
                bot_reply: None,
            },
        };

        let gate = self.hold_send.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }

        Ok(response)
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

fn test_config() -> ChatConfig {
    ChatConfig {
        poll_interval_ms: 3000,
        faq_reshow_delay_ms: 1500,
        assistant_name: "Fern".to_string(),
        user_label: "You".to_string(),
        initial_load_retries: 1,
        retry_delay_ms: 10,
    }
}

fn make_client(service: &Arc<FakeChatService>) -> ChatClient {
    ChatClient::new(
        service.clone(),
        Arc::new(MemoryStore::new()),
        test_config(),
    )
}

fn drain(rx: &mut broadcast::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn status_changes(events: &[ChatEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ChatEvent::StatusChanged(_)))
        .count()
}

fn olga() -> Agent {
    Agent {
        id: 7,
        display_name: "Ольга".to_string(),
    }
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn test_faq_prompt_gets_canned_answer_and_suggestions_return() {
    let service = FakeChatService::new();
    let client = make_client(&service);
    let mut events = client.subscribe();

    let opened = client.open(None).await.expect("open failed");
    assert_eq!(opened.status, Some(SessionStatus::Bot));
    assert!(opened.messages.is_empty());
    assert!(opened.faq_visible);
    assert_eq!(opened.suggestions.len(), 2);

    assert_eq!(
        client.select_faq(0),
        Some(FaqSelection::Draft(DELIVERY_QUESTION.to_string()))
    );
    assert_eq!(client.draft(), DELIVERY_QUESTION);

    let outcome = client.send_draft().await.expect("send failed");
    assert!(matches!(outcome, SendOutcome::Delivered { escalated: false, .. }));
    assert!(client.draft().is_empty());

    let snapshot = client.snapshot();
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].sender, SenderKind::User);
    assert_eq!(snapshot.messages[0].body, DELIVERY_QUESTION);
    assert_eq!(snapshot.messages[1].sender, SenderKind::Bot);
    assert_eq!(snapshot.messages[1].body, DELIVERY_ANSWER);
    assert_eq!(snapshot.messages[1].sender_label, "Fern");
    assert_eq!(snapshot.status, Some(SessionStatus::Bot));
    assert!(!snapshot.faq_visible, "suggestions wait for the reshow delay");

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert!(client.faq_visible());
    assert_eq!(client.snapshot().status, Some(SessionStatus::Bot));

    let events = drain(&mut events);
    assert!(events.contains(&ChatEvent::SuggestionsReady));
    assert_eq!(status_changes(&events), 0);

    client.close();
}

#[tokio::test]
async fn test_redirect_prompt_does_not_touch_draft() {
    let service = FakeChatService::new();
    let client = make_client(&service);
    client.open(None).await.unwrap();

    assert_eq!(client.select_faq(1), Some(FaqSelection::OpenTickets));
    assert!(client.draft().is_empty());
    assert_eq!(client.select_faq(5), None);
    client.close();
}

#[tokio::test]
async fn test_reopen_after_bot_answer_shows_suggestions() {
    let service = FakeChatService::new();
    service.push_message(SenderKind::User, "Visitor", DELIVERY_QUESTION);
    service.push_message(SenderKind::Bot, "Fern", DELIVERY_ANSWER);
    let client = make_client(&service);

    let opened = client.open(None).await.unwrap();
    assert_eq!(opened.messages.len(), 2);
    assert!(opened.faq_visible);
    assert_eq!(opened.suggestions.len(), 2);

    client.send("And to Kazan?").await.unwrap();
    assert!(!client.faq_visible());
    client.close();

    // Escalated: history ends with the user's message, waiting for an operator.
    let reopened = client.open(None).await.unwrap();
    assert!(!reopened.faq_visible);
    client.close();
}

#[tokio::test]
async fn test_escalation_hides_suggestions_across_polls() {
    let service = FakeChatService::new();
    let client = make_client(&service);
    let mut events = client.subscribe();
    client.open(None).await.unwrap();

    let outcome = client.send("I think my monstera has root rot").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Delivered { escalated: true, reply: None, .. }));

    let snapshot = client.snapshot();
    assert_eq!(snapshot.status, Some(SessionStatus::Waiting));
    assert!(!snapshot.faq_visible);
    assert!(snapshot.suggestions.is_empty());
    assert!(snapshot.banner.is_some());
    assert_eq!(status_changes(&drain(&mut events)), 1);

    for _ in 0..3 {
        let outcome = client.poll_once().await;
        assert!(matches!(outcome, PollOutcome::Applied { status_change: None, .. }));
        assert!(!client.faq_visible());
        assert_eq!(client.snapshot().status, Some(SessionStatus::Waiting));
    }
    assert_eq!(status_changes(&drain(&mut events)), 0);
    client.close();
}

#[tokio::test]
async fn test_agent_claim_is_reported_once() {
    let service = FakeChatService::new();
    service.set_session(SessionStatus::Waiting, None);
    let client = make_client(&service);
    let mut events = client.subscribe();
    client.open(None).await.unwrap();

    service.set_session(SessionStatus::Active, Some(olga()));
    let first = client.poll_once().await;
    match first {
        PollOutcome::Applied {
            status_change: Some(change),
            ..
        } => {
            assert_eq!(change.from, SessionStatus::Waiting);
            assert_eq!(change.to, SessionStatus::Active);
            assert_eq!(change.agent, Some(olga()));
        }
        other => panic!("Expected a status change, got {:?}", other),
    }

    let banner = client.snapshot().banner.expect("banner missing");
    assert!(banner.contains("Ольга"), "banner was: {}", banner);

    let second = client.poll_once().await;
    assert!(matches!(second, PollOutcome::Applied { status_change: None, appended: 0 }));
    assert_eq!(status_changes(&drain(&mut events)), 1);
    client.close();
}

// ===========================================================================
// Properties
// ===========================================================================

#[tokio::test]
async fn test_send_is_visible_before_network_resolves() {
    let service = FakeChatService::new();
    let client = make_client(&service);
    client.open(None).await.unwrap();
    let before = client.snapshot().messages.len();

    let gate = service.hold_sends();
    let sender = client.clone();
    let handle = tokio::spawn(async move { sender.send("Do you ship to Kazan?").await });

    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    let pending = client.snapshot();
    assert_eq!(pending.messages.len(), before + 1);
    let last = pending.messages.last().unwrap();
    assert_eq!(last.delivery, DeliveryState::Sending);
    assert!(matches!(last.id, MessageId::Local(_)));
    assert!(!pending.faq_visible);

    gate.add_permits(1);
    let outcome = handle.await.unwrap().unwrap();
    let SendOutcome::Delivered { message_id, .. } = outcome else {
        panic!("Expected delivery, got {:?}", outcome);
    };

    let confirmed = client.snapshot();
    assert_eq!(confirmed.messages[before].id, MessageId::Confirmed(message_id));
    assert_eq!(confirmed.messages[before].delivery, DeliveryState::Delivered);
    client.close();
}

#[tokio::test]
async fn test_poll_racing_a_send_never_duplicates() {
    let service = FakeChatService::new();
    let client = make_client(&service);
    client.open(None).await.unwrap();

    let gate = service.hold_sends();
    let sender = client.clone();
    let handle = tokio::spawn(async move { sender.send(DELIVERY_QUESTION).await });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    // The service has stored both messages; the poll delivers them first.
    client.poll_once().await;

    let mid_send = client.snapshot().messages;
    let copies: Vec<MessageId> = mid_send
        .iter()
        .filter(|m| m.body == DELIVERY_QUESTION)
        .map(|m| m.id)
        .collect();
    assert_eq!(copies.len(), 1, "user text shown more than once: {:?}", copies);
    assert!(copies[0].is_confirmed());
    assert_eq!(mid_send.len(), 2);

    gate.add_permits(1);
    handle.await.unwrap().unwrap();

    // Re-delivering the same batch is a no-op.
    let again = client.poll_once().await;
    assert!(matches!(again, PollOutcome::Applied { appended: 0, .. }));

    let messages = client.snapshot().messages;
    let ids: Vec<i64> = messages.iter().filter_map(|m| m.confirmed_id()).collect();
    let unique: HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len(), "duplicate ids in {:?}", ids);
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.id.is_confirmed()));
    client.close();
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_keeps_one_poll_outstanding() {
    let service = FakeChatService::new();
    let client = make_client(&service);
    client.open(None).await.unwrap();
    assert!(client.is_polling());
    let after_open = service.fetches();

    let gate = service.hold_fetches();
    tokio::time::sleep(Duration::from_millis(3000 * 4 + 100)).await;
    assert_eq!(service.fetches(), after_open + 1);

    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(service.fetches(), after_open + 2);
    client.close();
}

#[tokio::test(start_paused = true)]
async fn test_reopen_does_not_poll_while_old_poll_is_outstanding() {
    let service = FakeChatService::new();
    let client = make_client(&service);
    client.open(None).await.unwrap();

    let gate = service.hold_next_fetch();
    tokio::time::sleep(Duration::from_millis(3100)).await;
    let hung = service.fetches();

    client.close();
    client.open(None).await.unwrap();
    let after_reopen = service.fetches();
    assert_eq!(after_reopen, hung + 1);

    // Two ticks of the new loop pass while the old poll hangs.
    tokio::time::sleep(Duration::from_millis(8500)).await;
    assert_eq!(service.fetches(), after_reopen);

    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(service.fetches(), after_reopen + 1);
    assert!(client.snapshot().open);
    client.close();
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_polling_and_reopen_restarts() {
    let service = FakeChatService::new();
    let client = make_client(&service);
    client.open(None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(3100)).await;
    let polled = service.fetches();
    assert!(polled >= 2);

    client.close();
    assert!(!client.is_open());
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(service.fetches(), polled);

    client.open(None).await.unwrap();
    let reopened = service.fetches();
    tokio::time::sleep(Duration::from_millis(3100)).await;
    assert_eq!(service.fetches(), reopened + 1);
    client.close();
}

#[tokio::test]
async fn test_late_poll_after_close_is_discarded() {
    let service = FakeChatService::new();
    let client = make_client(&service);
    client.open(None).await.unwrap();

    service.push_message(SenderKind::Agent, "Ольга", "Hello!");
    let gate = service.hold_fetches();
    let poller = client.clone();
    let handle = tokio::spawn(async move { poller.poll_once().await });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    client.close();
    gate.add_permits(1);

    assert_eq!(handle.await.unwrap(), PollOutcome::Discarded);
    assert!(client.snapshot().messages.is_empty());
}

#[tokio::test]
async fn test_poll_failure_is_silent() {
    let service = FakeChatService::new();
    let client = make_client(&service);
    let mut events = client.subscribe();
    client.open(None).await.unwrap();

    service.fail_fetches.store(true, Ordering::SeqCst);
    assert_eq!(client.poll_once().await, PollOutcome::TransportFailed);
    assert!(drain(&mut events).is_empty());
    assert_eq!(client.snapshot().status, Some(SessionStatus::Bot));

    service.fail_fetches.store(false, Ordering::SeqCst);
    assert!(matches!(client.poll_once().await, PollOutcome::Applied { .. }));
    client.close();
}

#[tokio::test]
async fn test_failed_send_stays_visible_and_is_not_retried() {
    let service = FakeChatService::new();
    let client = make_client(&service);
    let mut events = client.subscribe();
    client.open(None).await.unwrap();

    service.fail_sends.store(true, Ordering::SeqCst);
    let outcome = client.send("Is the fig tree in stock?").await.unwrap();
    let SendOutcome::Failed { correlation, .. } = outcome else {
        panic!("Expected failure, got {:?}", outcome);
    };

    let snapshot = client.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].id, MessageId::Local(correlation));
    assert_eq!(snapshot.messages[0].delivery, DeliveryState::Failed);
    assert_eq!(service.send_calls.load(Ordering::SeqCst), 1);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, ChatEvent::SendFailed { correlation: c, .. } if *c == correlation)));

    // Sending again is a new message.
    service.fail_sends.store(false, Ordering::SeqCst);
    client.send("Is the fig tree in stock?").await.unwrap();
    let snapshot = client.snapshot();
    assert_eq!(snapshot.messages[0].delivery, DeliveryState::Failed);
    assert_eq!(snapshot.messages[1].delivery, DeliveryState::Delivered);
    client.close();
}

#[tokio::test]
async fn test_send_preconditions() {
    let service = FakeChatService::new();
    let client = make_client(&service);

    assert!(matches!(
        client.send("hello").await,
        Err(sprout_chat::ChatError::NotOpen)
    ));

    client.open(None).await.unwrap();
    assert!(matches!(
        client.send("   ").await,
        Err(sprout_chat::ChatError::EmptyMessage)
    ));

    service.set_session(SessionStatus::Closed, None);
    client.poll_once().await;
    assert!(matches!(
        client.send("hello?").await,
        Err(sprout_chat::ChatError::SessionClosed)
    ));

    client.set_draft("still here?");
    assert!(client.send_draft().await.is_err());
    assert_eq!(client.draft(), "still here?");
    assert_eq!(service.send_calls.load(Ordering::SeqCst), 0);
    client.close();
}

#[tokio::test]
async fn test_open_fails_cleanly_when_service_down() {
    let service = FakeChatService::new();
    service.fail_fetches.store(true, Ordering::SeqCst);
    let client = make_client(&service);

    let result = client.open(None).await;
    assert!(matches!(result, Err(sprout_chat::ChatError::Load(_))));
    assert!(!client.is_open());
    assert!(!client.is_polling());
}

#[tokio::test]
async fn test_guest_identity_is_reused_across_opens() {
    let service = FakeChatService::new();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let client = ChatClient::new(service.clone(), store.clone(), test_config());

    let first = client.open(None).await.unwrap().identity.unwrap();
    client.close();
    let second = client.open(None).await.unwrap().identity.unwrap();

    assert!(first.is_guest());
    assert_eq!(first.key, second.key);
    assert_eq!(store.get(GUEST_TOKEN_KEY).unwrap(), Some(first.key.clone()));

    client.close();
    let user = client.open(Some("user-42")).await.unwrap().identity.unwrap();
    assert_eq!(user.key, "user-42");
    assert_eq!(user.previous_guest, Some(first.key));
    client.close();
}

#[tokio::test]
async fn test_launcher_dismissal_is_persisted() {
    let service = FakeChatService::new();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let client = ChatClient::new(service.clone(), store.clone(), test_config());

    assert!(!client.launcher_dismissed());
    client.dismiss_launcher();
    assert!(client.launcher_dismissed());

    let other = ChatClient::new(service, store, test_config());
    assert!(other.launcher_dismissed());
}

// ===========================================================================
// HTTP transport end to end
// ===========================================================================

mod http {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_config() -> ChatConfig {
        ChatConfig {
            // Keep the background poller out of the way; polls are driven by hand.
            poll_interval_ms: 600_000,
            ..test_config()
        }
    }

    #[tokio::test]
    async fn test_client_over_http() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/session"))
            .and(query_param("identity", "user-42"))
            .and(query_param("guest", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "session": { "id": 31, "status": "bot" },
                "messages": [{
                    "id": 100,
                    "sender": "bot",
                    "senderLabel": "Fern",
                    "body": "Hi! Ask me anything about plant care.",
                    "createdAt": "2026-05-01T10:00:00Z"
                }]
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/faqs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "question": DELIVERY_QUESTION, "answer": DELIVERY_ANSWER }
            ])))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messageId": 101,
                "escalated": false,
                "botReply": { "id": 102, "text": DELIVERY_ANSWER }
            })))
            .mount(&mock_server)
            .await;

        let transport =
            HttpChatTransport::with_base_url(mock_server.uri(), Duration::from_secs(5)).unwrap();
        let client = ChatClient::new(
            Arc::new(transport),
            Arc::new(MemoryStore::new()),
            http_config(),
        );

        let opened = client.open(Some("user-42")).await.unwrap();
        assert_eq!(opened.session_id, Some(31));
        assert_eq!(opened.messages.len(), 1);
        assert!(opened.faq_visible);

        client.select_faq(0);
        let outcome = client.send_draft().await.unwrap();
        assert!(matches!(
            outcome,
            SendOutcome::Delivered { message_id: 101, .. }
        ));

        let ids: Vec<MessageId> = client.snapshot().messages.iter().map(|m| m.id).collect();
        assert_eq!(
            ids,
            vec![
                MessageId::Confirmed(100),
                MessageId::Confirmed(101),
                MessageId::Confirmed(102),
            ]
        );
        client.close();
    }

    #[tokio::test]
    async fn test_malformed_poll_leaves_state_untouched() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "session": { "id": 31, "status": "waiting" },
                "messages": []
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/session"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html>gateway timeout</html>"),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/faqs"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let transport =
            HttpChatTransport::with_base_url(mock_server.uri(), Duration::from_secs(5)).unwrap();
        let client = ChatClient::new(
            Arc::new(transport),
            Arc::new(MemoryStore::new()),
            http_config(),
        );

        let opened = client.open(None).await.unwrap();
        assert_eq!(opened.status, Some(SessionStatus::Waiting));
        assert!(opened.suggestions.is_empty());

        assert_eq!(client.poll_once().await, PollOutcome::Malformed);
        assert_eq!(client.snapshot().status, Some(SessionStatus::Waiting));
        assert!(client.is_open());
        client.close();
    }
}
