use thiserror::Error;

use crate::store::StoreError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum SproutError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
