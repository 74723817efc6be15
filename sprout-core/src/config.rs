use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SproutConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api/support".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    /// Period of the silent refresh while the chat view is open.
    pub poll_interval_ms: u64,
    /// Pause before FAQ suggestions come back after a non-escalated bot answer.
    pub faq_reshow_delay_ms: u64,
    pub assistant_name: String,
    pub user_label: String,
    pub initial_load_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
            faq_reshow_delay_ms: 1500,
            assistant_name: "Fern".to_string(),
            user_label: "You".to_string(),
            initial_load_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl ChatConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn faq_reshow_delay(&self) -> Duration {
        Duration::from_millis(self.faq_reshow_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "~/.sprout/chat.json".to_string(),
        }
    }
}

impl SproutConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}
