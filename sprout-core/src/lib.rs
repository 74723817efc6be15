pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod transport;

pub use config::{ChatConfig, SproutConfig};
pub use error::SproutError;
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use transport::{fetch_session_with_retry, ChatTransport, HttpChatTransport, TransportError};
