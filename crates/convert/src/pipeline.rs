//! The conversion pipeline: one call per file.
//!
//! Select converter → enforce limits → race the converter against its
//! deadline → canonicalize once → hash. Converter errors pass through
//! unchanged, with converter/source context attached.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use canonical::{canonicalize, mirror_hash};

use crate::error::ConvertError;
use crate::office::{DocxConverter, PptxConverter, XlsxConverter};
use crate::pdf::PdfConverter;
use crate::registry::ConverterRegistry;
use crate::text::{MarkdownConverter, PlainTextConverter};
use crate::types::{ConversionArtifact, ConvertInput};

/// Orchestrates registry dispatch and canonical hashing.
pub struct ConvertPipeline {
    registry: ConverterRegistry,
}

impl ConvertPipeline {
    pub fn new(registry: ConverterRegistry) -> Self {
        Self { registry }
    }

    /// A pipeline with the stock converters in priority order: markdown,
    /// plain text, then the structured-document adapters.
    pub fn with_default_converters() -> Self {
        let mut registry = ConverterRegistry::new();
        registry.register(Arc::new(MarkdownConverter));
        registry.register(Arc::new(PlainTextConverter));
        registry.register(Arc::new(PdfConverter));
        registry.register(Arc::new(DocxConverter));
        registry.register(Arc::new(XlsxConverter));
        registry.register(Arc::new(PptxConverter));
        Self { registry }
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Convert one file into its canonical artifact.
    ///
    /// The converter itself runs on the blocking pool and is raced against
    /// `limits.timeout_ms`. Losing the race yields `TIMEOUT`; the blocking
    /// task is detached and may keep running until the underlying library
    /// returns (no process isolation).
    pub async fn convert(&self, input: ConvertInput) -> Result<ConversionArtifact, ConvertError> {
        let size = input.bytes.len() as u64;
        if size > input.limits.max_bytes {
            return Err(ConvertError::too_large(size, input.limits.max_bytes)
                .with_source_path(&input.rel_path)
                .with_mime(&input.mime)
                .with_ext(&input.ext));
        }

        let converter = self
            .registry
            .select(&input.mime, &input.ext)
            .map_err(|e| e.with_source_path(&input.rel_path))?;

        let converter_id = converter.id();
        let converter_version = converter.version();
        let timeout_ms = input.limits.timeout_ms;
        let rel_path = input.rel_path.clone();
        let source_mime = input.mime.clone();

        tracing::debug!(
            rel_path = %rel_path,
            converter = converter_id,
            bytes = size,
            "converting"
        );

        let task = tokio::task::spawn_blocking(move || converter.convert(&input));
        let output = match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
            Err(_) => {
                tracing::warn!(rel_path = %rel_path, converter = converter_id, "conversion timed out");
                return Err(ConvertError::timeout(timeout_ms)
                    .with_converter(converter_id)
                    .with_source_path(&rel_path));
            }
            Ok(Err(join_err)) => {
                return Err(ConvertError::internal(format!("converter panicked: {join_err}"))
                    .with_converter(converter_id)
                    .with_source_path(&rel_path));
            }
            Ok(Ok(result)) => result.map_err(|e| {
                let e = if e.converter_id.is_none() {
                    e.with_converter(converter_id)
                } else {
                    e
                };
                e.with_source_path(&rel_path)
            })?,
        };

        let canonical_markdown = canonicalize(&output.markdown);
        let hash = mirror_hash(&canonical_markdown);

        Ok(ConversionArtifact {
            canonical_markdown,
            mirror_hash: hash,
            title: output.title,
            language_hint: output.language_hint,
            converter_id: converter_id.to_string(),
            converter_version,
            source_mime,
            warnings: output.warnings,
        })
    }
}

static DEFAULT_PIPELINE: Mutex<Option<Arc<ConvertPipeline>>> = Mutex::new(None);

/// The process-wide pipeline with the stock converters.
///
/// Lazily built under a lock, so concurrent first calls share a single
/// initialization and observe the same instance.
pub fn default_pipeline() -> Arc<ConvertPipeline> {
    let mut slot = DEFAULT_PIPELINE.lock().unwrap_or_else(|e| e.into_inner());
    slot.get_or_insert_with(|| Arc::new(ConvertPipeline::with_default_converters()))
        .clone()
}

/// Drop the process-wide pipeline so the next call rebuilds it. Test hook.
pub fn reset_default_pipeline() {
    let mut slot = DEFAULT_PIPELINE.lock().unwrap_or_else(|e| e.into_inner());
    *slot = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertErrorKind;
    use crate::mime::{MIME_MARKDOWN, MIME_PLAIN};
    use crate::registry::Converter;
    use crate::types::{ConvertLimits, ConverterOutput};

    #[tokio::test]
    async fn markdown_roundtrip_is_canonical() {
        let pipeline = ConvertPipeline::with_default_converters();
        let input = ConvertInput::new(
            "notes/a.md",
            b"# T\r\n\r\nA  \r\n\r\n\r\nB\r\n\r\n".to_vec(),
            MIME_MARKDOWN,
        );
        let artifact = pipeline.convert(input).await.unwrap();
        assert_eq!(artifact.canonical_markdown, "# T\n\nA\n\nB\n");
        assert_eq!(artifact.mirror_hash, mirror_hash("# T\n\nA\n\nB\n"));
        assert_eq!(artifact.title.as_deref(), Some("T"));
        assert_eq!(artifact.converter_id, "markdown");
    }

    #[tokio::test]
    async fn oversized_input_is_rejected_before_dispatch() {
        let pipeline = ConvertPipeline::with_default_converters();
        let input = ConvertInput::new("notes/big.txt", vec![b'x'; 64], MIME_PLAIN).with_limits(
            ConvertLimits {
                max_bytes: 16,
                timeout_ms: 1_000,
            },
        );
        let err = pipeline.convert(input).await.unwrap_err();
        assert_eq!(err.kind, ConvertErrorKind::TooLarge);
    }

    #[tokio::test]
    async fn unknown_format_is_unsupported() {
        let pipeline = ConvertPipeline::with_default_converters();
        let input = ConvertInput::new("bin/blob.so", vec![0u8; 8], "application/octet-stream");
        let err = pipeline.convert(input).await.unwrap_err();
        assert_eq!(err.kind, ConvertErrorKind::Unsupported);
        assert_eq!(err.source_path.as_deref(), Some("bin/blob.so"));
    }

    struct SlowConverter;

    impl Converter for SlowConverter {
        fn id(&self) -> &'static str {
            "slow"
        }
        fn version(&self) -> u32 {
            1
        }
        fn can_handle(&self, _mime: &str, _ext: &str) -> bool {
            true
        }
        fn convert(&self, _input: &ConvertInput) -> Result<ConverterOutput, ConvertError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(ConverterOutput::new("late"))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deadline_race_returns_timeout() {
        let mut registry = ConverterRegistry::new();
        registry.register(Arc::new(SlowConverter));
        let pipeline = ConvertPipeline::new(registry);

        let input = ConvertInput::new("notes/slow.txt", b"x".to_vec(), MIME_PLAIN).with_limits(
            ConvertLimits {
                max_bytes: 1024,
                timeout_ms: 20,
            },
        );
        let err = pipeline.convert(input).await.unwrap_err();
        assert_eq!(err.kind, ConvertErrorKind::Timeout);
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn default_pipeline_is_shared_and_resettable() {
        reset_default_pipeline();
        let first = default_pipeline();
        let second = default_pipeline();
        assert!(Arc::ptr_eq(&first, &second));

        reset_default_pipeline();
        let third = default_pipeline();
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
