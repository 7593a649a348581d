use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid hex public key: {0}")]
    InvalidHex(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Hex(#[from] hex::FromHexError),

    #[error(transparent)]
    NostrKey(#[from] nostr::key::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
