use shared::error::{ChainError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("contract read failed: {0}")]
    ReadFailure(ChainError),
    #[error("transaction failed: {0}")]
    WriteRejected(ChainError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SyncError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::ReadFailure(err) | SyncError::WriteRejected(err) => err.code,
            SyncError::InvalidInput(_) => ErrorCode::Validation,
        }
    }

    /// Human-readable reason suitable for direct display.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::ReadFailure(err) | SyncError::WriteRejected(err) => err.reason(),
            SyncError::InvalidInput(message) => message.clone(),
        }
    }
}
