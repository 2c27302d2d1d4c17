//! MIME detection: magic-byte sniffing with extension fallback.
//!
//! Priority order:
//!
//! 1. `%PDF-` prefix → `application/pdf` (pure sniff).
//! 2. `PK\x03\x04` with a non-OOXML extension → `application/zip`
//!    (pure sniff; the generic container wins when the extension does not
//!    narrow it).
//! 3. `PK\x03\x04` with `.docx`/`.xlsx`/`.pptx` → the corresponding OOXML
//!    MIME (sniff+ext).
//! 4. Extension table fallback.
//! 5. `application/octet-stream`.
//!
//! Extension comparison is case-insensitive throughout.

use std::sync::Mutex;

pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_PLAIN: &str = "text/plain";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_ZIP: &str = "application/zip";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

const PDF_MAGIC: &[u8] = b"%PDF-";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// How sure the detector is about a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Which rule produced a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    /// Magic bytes alone.
    Sniff,
    /// Magic bytes narrowed by the extension.
    SniffExt,
    /// Extension table only.
    Ext,
    /// Nothing matched.
    Fallback,
}

/// A MIME detection result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeGuess {
    pub mime: &'static str,
    pub confidence: Confidence,
    pub method: DetectionMethod,
}

/// Stateless detector; see the module docs for the priority rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct MimeDetector;

impl MimeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect the MIME type for raw bytes plus a (possibly empty) extension.
    pub fn detect(&self, bytes: &[u8], ext: &str) -> MimeGuess {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();

        if bytes.starts_with(PDF_MAGIC) {
            return MimeGuess {
                mime: MIME_PDF,
                confidence: Confidence::High,
                method: DetectionMethod::Sniff,
            };
        }

        if bytes.starts_with(ZIP_MAGIC) {
            if let Some(mime) = ooxml_mime(&ext) {
                return MimeGuess {
                    mime,
                    confidence: Confidence::High,
                    method: DetectionMethod::SniffExt,
                };
            }
            return MimeGuess {
                mime: MIME_ZIP,
                confidence: Confidence::High,
                method: DetectionMethod::Sniff,
            };
        }

        if let Some(mime) = extension_mime(&ext) {
            return MimeGuess {
                mime,
                confidence: Confidence::Medium,
                method: DetectionMethod::Ext,
            };
        }

        MimeGuess {
            mime: MIME_OCTET_STREAM,
            confidence: Confidence::Low,
            method: DetectionMethod::Fallback,
        }
    }
}

fn ooxml_mime(ext: &str) -> Option<&'static str> {
    match ext {
        "docx" => Some(MIME_DOCX),
        "xlsx" => Some(MIME_XLSX),
        "pptx" => Some(MIME_PPTX),
        _ => None,
    }
}

fn extension_mime(ext: &str) -> Option<&'static str> {
    match ext {
        "md" | "markdown" | "mdown" | "mkd" => Some(MIME_MARKDOWN),
        "txt" | "text" | "log" => Some(MIME_PLAIN),
        "pdf" => Some(MIME_PDF),
        "docx" => Some(MIME_DOCX),
        "xlsx" => Some(MIME_XLSX),
        "pptx" => Some(MIME_PPTX),
        "zip" => Some(MIME_ZIP),
        "html" | "htm" => Some("text/html"),
        "json" => Some("application/json"),
        "csv" => Some("text/csv"),
        _ => None,
    }
}

static DEFAULT_DETECTOR: Mutex<Option<MimeDetector>> = Mutex::new(None);

/// The process-wide detector. Initialization is idempotent; concurrent
/// first calls observe the same instance.
pub fn default_detector() -> MimeDetector {
    let mut slot = DEFAULT_DETECTOR.lock().unwrap_or_else(|e| e.into_inner());
    *slot.get_or_insert_with(MimeDetector::new)
}

/// Drop the process-wide detector so the next call rebuilds it. Test hook.
pub fn reset_default_detector() {
    let mut slot = DEFAULT_DETECTOR.lock().unwrap_or_else(|e| e.into_inner());
    *slot = None;
}
