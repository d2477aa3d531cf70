use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    StaleReference,
    Transport,
    DuplicateRegistration,
    InvalidTransition,
    Validation,
}

/// Failures handled inside the coordinators. None of these reach a caller;
/// they are logged at a level matching their code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code:?}: {message}")]
pub struct CoreError {
    pub code: ErrorCode,
    pub message: String,
}

impl CoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn stale_reference(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StaleReference, message)
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::Transport, err.to_string())
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidTransition, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn log(&self, operation: &str) {
        match self.code {
            ErrorCode::Unauthorized | ErrorCode::Transport | ErrorCode::Validation => {
                warn!(operation, code = ?self.code, "{}", self.message)
            }
            ErrorCode::StaleReference
            | ErrorCode::DuplicateRegistration
            | ErrorCode::InvalidTransition => {
                debug!(operation, code = ?self.code, "{}", self.message)
            }
        }
    }
}
