use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Transport,
    Decode,
    OutOfRange,
    Reverted,
    UserRejected,
    InsufficientFunds,
    Validation,
    Timeout,
}

impl ErrorCode {
    pub fn describe(self) -> &'static str {
        match self {
            ErrorCode::Transport => "chain unreachable",
            ErrorCode::Decode => "malformed chain response",
            ErrorCode::OutOfRange => "index out of range",
            ErrorCode::Reverted => "contract reverted",
            ErrorCode::UserRejected => "request rejected by wallet",
            ErrorCode::InsufficientFunds => "insufficient funds",
            ErrorCode::Validation => "invalid input",
            ErrorCode::Timeout => "timed out",
        }
    }
}

pub type ChainResult<T> = std::result::Result<T, ChainError>;

/// Failure reported by a chain read or write.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}: {message}", code.describe())]
pub struct ChainError {
    pub code: ErrorCode,
    pub message: String,
}

impl ChainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transport, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Decode, message)
    }

    pub fn reverted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Reverted, message)
    }

    /// Text shown to the user when a write fails.
    pub fn reason(&self) -> String {
        if self.message.is_empty() {
            self.code.describe().to_string()
        } else {
            self.message.clone()
        }
    }
}
