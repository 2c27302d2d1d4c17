//! Converter trait and ordered registry.

use std::sync::Arc;

use crate::error::ConvertError;
use crate::types::{ConvertInput, ConverterOutput};

/// A format-specific converter.
///
/// Converters are pure byte-to-markdown transforms: they read
/// `input.bytes`, never the filesystem, and they emit raw markdown. The
/// pipeline canonicalizes; converters that canonicalize themselves would
/// break hash compatibility with the rest of the registry.
pub trait Converter: Send + Sync {
    /// Stable identifier recorded on documents and artifacts.
    fn id(&self) -> &'static str;

    /// Bumped whenever this converter's output changes for the same input.
    fn version(&self) -> u32;

    /// Whether this converter accepts the MIME/extension pair. The
    /// extension arrives lowercase without a leading dot.
    fn can_handle(&self, mime: &str, ext: &str) -> bool;

    fn convert(&self, input: &ConvertInput) -> Result<ConverterOutput, ConvertError>;
}

/// Ordered converter dispatch. Registration order is priority: the first
/// converter whose `can_handle` accepts wins.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: Vec<Arc<dyn Converter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, converter: Arc<dyn Converter>) {
        self.converters.push(converter);
    }

    /// Pick the first converter accepting the pair, or `UNSUPPORTED`.
    pub fn select(&self, mime: &str, ext: &str) -> Result<Arc<dyn Converter>, ConvertError> {
        self.converters
            .iter()
            .find(|c| c.can_handle(mime, ext))
            .cloned()
            .ok_or_else(|| ConvertError::unsupported(mime, ext))
    }

    pub fn converter_ids(&self) -> Vec<&'static str> {
        self.converters.iter().map(|c| c.id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}
