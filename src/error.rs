use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Error classes surfaced by the instruction engine.
///
/// Everything except `Integrity` is recoverable: the presentation layer
/// shows the message and the triggering operation is simply blocked.
/// `Integrity` signals a caller/programming error; the engine's own
/// preconditions were violated before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Validation,
    TierDowngrade,
    MismatchUnresolved,
    Integrity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Validation,
            message: message.into(),
        }
    }

    pub fn tier_downgrade(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::TierDowngrade,
            message: message.into(),
        }
    }

    pub fn mismatch_unresolved(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::MismatchUnresolved,
            message: message.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Integrity,
            message: message.into(),
        }
    }

    /// Integrity errors are not user-recoverable; the embedding
    /// application should treat them as crash-worthy.
    pub fn is_fatal(&self) -> bool {
        self.code == ErrorCode::Integrity
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Error for EngineError {}
