//! Model-runtime error surface.

use thiserror::Error;

/// Stable failure kinds for model-runtime calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EmbedErrorKind {
    /// The runtime call itself failed (process, network, model load).
    Runtime,
    /// The call exceeded its deadline.
    Timeout,
    /// The request or response shape was wrong (dimension mismatch,
    /// batch length mismatch, malformed output).
    Validation,
}

impl EmbedErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            EmbedErrorKind::Runtime => "RUNTIME",
            EmbedErrorKind::Timeout => "TIMEOUT",
            EmbedErrorKind::Validation => "VALIDATION",
        }
    }

    pub fn retryable(self) -> bool {
        matches!(self, EmbedErrorKind::Runtime | EmbedErrorKind::Timeout)
    }
}

/// A model-runtime failure.
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", kind.code())]
pub struct EmbedError {
    pub kind: EmbedErrorKind,
    pub message: String,
}

impl EmbedError {
    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            kind: EmbedErrorKind::Runtime,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: EmbedErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: EmbedErrorKind::Validation,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}
