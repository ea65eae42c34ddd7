use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid listing type: {0}")]
    InvalidListingType(String),

    #[error("Invalid verification token format")]
    InvalidToken,

    #[error("Verification token already in use")]
    TokenCollision,

    #[error("Claim not found: {0}")]
    ClaimNotFound(String),

    #[error("Storage timed out after {0} ms")]
    Timeout(u64),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
