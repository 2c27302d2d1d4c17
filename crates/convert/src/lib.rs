//! GNO Conversion Layer - Bytes to Canonical Markdown
//!
//! This crate turns raw source-file bytes into a [`ConversionArtifact`]: the
//! canonical markdown mirror of the file plus its content-addressed hash.
//!
//! # Pipeline Position
//!
//! ```text
//! Discovery ──▶ MIME detect ──▶ Convert ──▶ Canonicalize ──▶ Store
//!                  (C4)          (C2)          (C1)
//! ```
//!
//! Three pieces live here:
//!
//! - [`MimeDetector`]: magic-byte sniffing with extension fallback.
//! - [`ConverterRegistry`]: ordered dispatch of bytes + MIME + extension to
//!   a format-specific [`Converter`]. First registered match wins.
//! - [`ConvertPipeline`]: one call per file: select converter, enforce
//!   limits, race the converter against its deadline, canonicalize exactly
//!   once, hash.
//!
//! Converters emit *raw* markdown and must not canonicalize; running the
//! canonicalizer in exactly one place keeps every converter hash-compatible.
//!
//! Long-running extraction libraries cannot be interrupted: the deadline
//! race returns [`ConvertErrorKind::Timeout`] while the underlying blocking
//! work may keep running until it finishes on its own. There is no process
//! isolation here.

mod error;
mod mime;
mod office;
mod pdf;
mod pipeline;
mod registry;
mod text;
mod types;

pub use crate::error::{ConvertError, ConvertErrorKind};
pub use crate::mime::{
    default_detector, reset_default_detector, Confidence, DetectionMethod, MimeDetector, MimeGuess,
};
pub use crate::office::{DocxConverter, PptxConverter, XlsxConverter};
pub use crate::pdf::PdfConverter;
pub use crate::pipeline::{default_pipeline, reset_default_pipeline, ConvertPipeline};
pub use crate::registry::{Converter, ConverterRegistry};
pub use crate::text::{MarkdownConverter, PlainTextConverter};
pub use crate::types::{ConversionArtifact, ConvertInput, ConvertLimits, ConverterOutput};
