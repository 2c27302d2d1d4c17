//! Passthrough converters for markdown and plain text.

use crate::error::ConvertError;
use crate::mime::{MIME_MARKDOWN, MIME_PLAIN};
use crate::registry::Converter;
use crate::types::{ConvertInput, ConverterOutput};

/// Markdown passthrough. The title hint is the first ATX heading outside
/// code fences.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownConverter;

impl Converter for MarkdownConverter {
    fn id(&self) -> &'static str {
        "markdown"
    }

    fn version(&self) -> u32 {
        1
    }

    fn can_handle(&self, mime: &str, ext: &str) -> bool {
        mime == MIME_MARKDOWN || matches!(ext, "md" | "markdown" | "mdown" | "mkd")
    }

    fn convert(&self, input: &ConvertInput) -> Result<ConverterOutput, ConvertError> {
        let (markdown, mut output) = decode_utf8(&input.bytes);
        output.title = first_heading(&markdown);
        output.markdown = markdown;
        Ok(output)
    }
}

/// Plain-text passthrough. The title hint is the file stem.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextConverter;

impl Converter for PlainTextConverter {
    fn id(&self) -> &'static str {
        "plaintext"
    }

    fn version(&self) -> u32 {
        1
    }

    fn can_handle(&self, mime: &str, ext: &str) -> bool {
        mime.starts_with("text/") || matches!(ext, "txt" | "text" | "log")
    }

    fn convert(&self, input: &ConvertInput) -> Result<ConverterOutput, ConvertError> {
        let (markdown, mut output) = decode_utf8(&input.bytes);
        let stem = input.file_stem();
        if !stem.is_empty() {
            output.title = Some(stem.to_string());
        }
        output.markdown = markdown;
        Ok(output)
    }
}

/// Decode bytes as UTF-8, replacing invalid sequences with U+FFFD and
/// carrying a warning when replacement happened.
fn decode_utf8(bytes: &[u8]) -> (String, ConverterOutput) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), ConverterOutput::default()),
        Err(_) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            let output = ConverterOutput::default()
                .with_warning("invalid UTF-8 sequences replaced with U+FFFD");
            (text, output)
        }
    }
}

/// First ATX heading outside fenced code blocks, with `#` markers and
/// surrounding whitespace stripped.
fn first_heading(markdown: &str) -> Option<String> {
    let mut fence: Option<&str> = None;
    for line in markdown.lines() {
        let trimmed = line.trim_start();
        if let Some(open) = fence {
            if trimmed.starts_with(open) {
                fence = None;
            }
            continue;
        }
        if trimmed.starts_with("```") {
            fence = Some("```");
            continue;
        }
        if trimmed.starts_with("~~~") {
            fence = Some("~~~");
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('#') {
            let rest = rest.trim_start_matches('#');
            let title = rest.trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    None
}
