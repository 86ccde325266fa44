use thiserror::Error;

/// Reasons a stream token was rejected.
///
/// These never leave the process: [`ClaimManager::verify`](super::ClaimManager::verify)
/// folds all of them into `None`, and they only show up in debug logs.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ClaimError {
    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("AEAD decryption failed")]
    AeadFail,

    #[error("Key not found: {0}")]
    KeyNotFound(u8),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}
