use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Network,
    NotFound,
    Validation,
    Wallet,
    Rejected,
    Internal,
}

impl ErrorCode {
    /// Generic headline shown ahead of the detailed message.
    pub fn headline(self) -> &'static str {
        match self {
            ErrorCode::Network => "Network request failed",
            ErrorCode::NotFound => "Not found",
            ErrorCode::Validation => "Invalid input",
            ErrorCode::Wallet => "Wallet unavailable",
            ErrorCode::Rejected => "Transaction failed",
            ErrorCode::Internal => "Something went wrong",
        }
    }
}

/// A user-visible failure notification.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("{}: {message}", .code.headline())]
pub struct UserNotice {
    pub code: ErrorCode,
    pub message: String,
}

impl UserNotice {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
