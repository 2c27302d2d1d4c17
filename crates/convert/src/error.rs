//! Error surface for the conversion layer.
//!
//! Every failure is a [`ConvertError`]: a stable machine-readable kind plus
//! the context a caller needs to journal the failure against the source
//! file. The kind strings are part of the external contract; front-ends and
//! the ingest-error journal key off them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable failure kinds emitted by converters and the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ConvertErrorKind {
    /// No registered converter can handle the MIME/extension pair.
    Unsupported,
    /// Input exceeds `ConvertLimits::max_bytes`.
    TooLarge,
    /// The converter lost the race against its deadline.
    Timeout,
    /// The input is malformed for its claimed format.
    Corrupt,
    /// The source could not be read due to access rights.
    Permission,
    /// An I/O failure outside the converter's control.
    Io,
    /// The underlying extraction library failed.
    AdapterFailure,
    /// A bug: an invariant inside the conversion layer broke.
    Internal,
}

impl ConvertErrorKind {
    /// Stable identifier, as journaled and surfaced to collaborators.
    pub fn code(self) -> &'static str {
        match self {
            ConvertErrorKind::Unsupported => "UNSUPPORTED",
            ConvertErrorKind::TooLarge => "TOO_LARGE",
            ConvertErrorKind::Timeout => "TIMEOUT",
            ConvertErrorKind::Corrupt => "CORRUPT",
            ConvertErrorKind::Permission => "PERMISSION",
            ConvertErrorKind::Io => "IO",
            ConvertErrorKind::AdapterFailure => "ADAPTER_FAILURE",
            ConvertErrorKind::Internal => "INTERNAL",
        }
    }

    /// Whether a retry with unchanged input can reasonably succeed.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ConvertErrorKind::Timeout | ConvertErrorKind::Io | ConvertErrorKind::AdapterFailure
        )
    }
}

/// A conversion failure with source context.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{}: {message}", kind.code())]
pub struct ConvertError {
    pub kind: ConvertErrorKind,
    pub message: String,
    /// True when the current file must be abandoned (it never aborts the
    /// surrounding batch).
    pub fatal: bool,
    pub converter_id: Option<String>,
    pub source_path: Option<String>,
    pub mime: Option<String>,
    pub ext: Option<String>,
}

impl ConvertError {
    pub fn new(kind: ConvertErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fatal: false,
            converter_id: None,
            source_path: None,
            mime: None,
            ext: None,
        }
    }

    pub fn unsupported(mime: &str, ext: &str) -> Self {
        Self::new(
            ConvertErrorKind::Unsupported,
            format!("no converter for mime '{mime}' ext '{ext}'"),
        )
        .with_mime(mime)
        .with_ext(ext)
    }

    pub fn too_large(actual: u64, max: u64) -> Self {
        Self::new(
            ConvertErrorKind::TooLarge,
            format!("input is {actual} bytes, limit is {max}"),
        )
        .fatal_for_file()
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::new(
            ConvertErrorKind::Timeout,
            format!("conversion exceeded {timeout_ms}ms; background extraction may still be running"),
        )
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(ConvertErrorKind::Corrupt, message).fatal_for_file()
    }

    pub fn adapter(message: impl Into<String>) -> Self {
        Self::new(ConvertErrorKind::AdapterFailure, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ConvertErrorKind::Internal, message)
    }

    pub fn with_converter(mut self, id: &str) -> Self {
        self.converter_id = Some(id.to_string());
        self
    }

    pub fn with_source_path(mut self, path: &str) -> Self {
        self.source_path = Some(path.to_string());
        self
    }

    pub fn with_mime(mut self, mime: &str) -> Self {
        self.mime = Some(mime.to_string());
        self
    }

    pub fn with_ext(mut self, ext: &str) -> Self {
        self.ext = Some(ext.to_string());
        self
    }

    pub fn fatal_for_file(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ConvertErrorKind::Timeout.retryable());
        assert!(ConvertErrorKind::Io.retryable());
        assert!(ConvertErrorKind::AdapterFailure.retryable());
        assert!(!ConvertErrorKind::Unsupported.retryable());
        assert!(!ConvertErrorKind::Corrupt.retryable());
        assert!(!ConvertErrorKind::TooLarge.retryable());
    }

    #[test]
    fn display_carries_stable_code() {
        let err = ConvertError::too_large(10, 5);
        assert!(err.to_string().starts_with("TOO_LARGE: "));
        assert!(err.fatal);
    }

    #[test]
    fn context_builders_attach() {
        let err = ConvertError::unsupported("application/x-thing", "thing")
            .with_converter("markdown")
            .with_source_path("notes/a.thing");
        assert_eq!(err.converter_id.as_deref(), Some("markdown"));
        assert_eq!(err.source_path.as_deref(), Some("notes/a.thing"));
        assert_eq!(err.mime.as_deref(), Some("application/x-thing"));
    }
}
