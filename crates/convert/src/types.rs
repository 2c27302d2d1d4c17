//! Inputs and outputs of the conversion pipeline.

use serde::{Deserialize, Serialize};

/// Resource limits enforced around a single conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertLimits {
    /// Maximum accepted input size in bytes.
    pub max_bytes: u64,
    /// Deadline for the converter call.
    pub timeout_ms: u64,
}

impl Default for ConvertLimits {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
            timeout_ms: 30_000,
        }
    }
}

/// One file handed to the pipeline.
#[derive(Debug, Clone)]
pub struct ConvertInput {
    /// Collection-relative path, `/`-separated.
    pub rel_path: String,
    /// Absolute path on disk when the caller has one (diagnostics only;
    /// converters read `bytes`, never the filesystem).
    pub abs_path: Option<String>,
    /// Raw source bytes.
    pub bytes: Vec<u8>,
    /// Detected MIME type.
    pub mime: String,
    /// Lowercase extension without the leading dot; empty when absent.
    pub ext: String,
    pub limits: ConvertLimits,
}

impl ConvertInput {
    pub fn new(rel_path: impl Into<String>, bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        let rel_path = rel_path.into();
        let file_name = rel_path.rsplit('/').next().unwrap_or(&rel_path);
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            rel_path,
            abs_path: None,
            bytes,
            mime: mime.into(),
            ext,
            limits: ConvertLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ConvertLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The file stem of `rel_path`, used as a title fallback.
    pub fn file_stem(&self) -> &str {
        let name = self.rel_path.rsplit('/').next().unwrap_or(&self.rel_path);
        name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
    }
}

/// What a converter produces: raw markdown plus hints.
///
/// The markdown is *not* canonicalized; the pipeline canonicalizes exactly
/// once so every converter stays hash-compatible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConverterOutput {
    pub markdown: String,
    pub title: Option<String>,
    /// BCP-47 hint when the format carries one.
    pub language_hint: Option<String>,
    pub warnings: Vec<String>,
}

impl ConverterOutput {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// The finished product of the pipeline: canonical text plus its
/// content-addressed identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionArtifact {
    pub canonical_markdown: String,
    /// Lowercase 64-hex SHA-256 of `canonical_markdown`.
    pub mirror_hash: String,
    pub title: Option<String>,
    pub language_hint: Option<String>,
    pub converter_id: String,
    pub converter_version: u32,
    pub source_mime: String,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_derives_lowercase_ext() {
        let input = ConvertInput::new("Notes/Report.DOCX", vec![], "application/octet-stream");
        assert_eq!(input.ext, "docx");
        assert_eq!(input.file_stem(), "Report");
    }

    #[test]
    fn input_without_extension() {
        let input = ConvertInput::new("notes/README", vec![], "text/plain");
        assert_eq!(input.ext, "");
        assert_eq!(input.file_stem(), "README");
    }
}
