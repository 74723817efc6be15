//! Transport client for the remote support-chat service
//!
//! Three calls, all JSON over HTTP:
//! - `GET  {base}/session?identity=<key>&guest=<bool>` — session + messages
//! - `GET  {base}/faqs` — quick-reply prompts
//! - `POST {base}/send` — one user message, possibly answered by the bot

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::ServiceConfig;
use crate::models::{ConversationIdentity, FaqPrompt, SendRequest, SendResponse, SessionSnapshot};

// ============================================================================
// ChatTransport trait
// ============================================================================

/// Abstraction over the chat service so the client can run against a fake.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn fetch_session(
        &self,
        identity: &ConversationIdentity,
    ) -> Result<SessionSnapshot, TransportError>;

    async fn fetch_faqs(&self) -> Result<Vec<FaqPrompt>, TransportError>;

    async fn send_message(&self, request: &SendRequest) -> Result<SendResponse, TransportError>;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("All {attempts} attempts failed; last error: {last}")]
    RetryExhausted {
        attempts: usize,
        #[source]
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Whether the failure came from the shape of the response rather than
    /// from the network.
    pub fn is_malformed(&self) -> bool {
        matches!(self, TransportError::Malformed(_))
    }

    /// Network failures, throttling and 5xx answers may succeed on a later
    /// attempt; a malformed body or another 4xx will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Http(_) => true,
            TransportError::Api { code, .. } => *code >= 500 || *code == 429,
            TransportError::Malformed(_) | TransportError::RetryExhausted { .. } => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
}

// ============================================================================
// HttpChatTransport
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpChatTransport {
    client: Client,
    base_url: String,
}

impl HttpChatTransport {
    pub fn new(config: &ServiceConfig) -> Result<Self, TransportError> {
        Self::with_base_url(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_seconds),
        )
    }

    /// Create a transport with a custom base URL (for testing / integration)
    pub fn with_base_url(base_url: String, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|e| e.error)
                .unwrap_or(body);

            tracing::warn!(code = status.as_u16(), message = %message, "Chat service error");

            return Err(TransportError::Api {
                code: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn fetch_session(
        &self,
        identity: &ConversationIdentity,
    ) -> Result<SessionSnapshot, TransportError> {
        let url = format!("{}/session", self.base_url);
        let guest = if identity.is_guest() { "true" } else { "false" };

        let response = self
            .client
            .get(&url)
            .query(&[("identity", identity.key.as_str()), ("guest", guest)])
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn fetch_faqs(&self) -> Result<Vec<FaqPrompt>, TransportError> {
        let url = format!("{}/faqs", self.base_url);
        let response = self.client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendResponse, TransportError> {
        let url = format!("{}/send", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;
        Self::decode(response).await
    }
}

/// Initial session load with exponential backoff.
///
/// Only the load on chat open is retried; polls and sends are not. Errors
/// that cannot succeed on retry are returned as they are.
pub async fn fetch_session_with_retry(
    transport: &dyn ChatTransport,
    identity: &ConversationIdentity,
    max_retries: usize,
    retry_delay_ms: u64,
) -> Result<SessionSnapshot, TransportError> {
    let retry_strategy = ExponentialBackoff::from_millis(retry_delay_ms.max(1))
        .max_delay(Duration::from_secs(5))
        .map(jitter)
        .take(max_retries);

    let mut attempts = 0usize;
    let result = RetryIf::spawn(
        retry_strategy,
        || {
            attempts += 1;
            transport.fetch_session(identity)
        },
        TransportError::is_retryable,
    )
    .await;

    match result {
        Ok(snapshot) => Ok(snapshot),
        Err(e) if !e.is_retryable() => {
            tracing::warn!(attempts, error = %e, "Initial chat session load failed");
            Err(e)
        }
        Err(e) => {
            tracing::warn!(attempts, error = %e, "Initial chat session load failed");
            Err(TransportError::RetryExhausted {
                attempts,
                last: Box::new(e),
            })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
