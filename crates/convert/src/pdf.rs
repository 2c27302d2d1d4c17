//! PDF text extraction via lopdf.

use lopdf::Document;

use crate::error::{ConvertError, ConvertErrorKind};
use crate::mime::MIME_PDF;
use crate::registry::Converter;
use crate::types::{ConvertInput, ConverterOutput};

/// Extracts page text from PDF documents.
///
/// Layout is not reconstructed: the extractor concatenates the text runs of
/// each page in content-stream order, which is adequate for indexing but
/// not for display fidelity.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfConverter;

impl Converter for PdfConverter {
    fn id(&self) -> &'static str {
        "pdf"
    }

    fn version(&self) -> u32 {
        1
    }

    fn can_handle(&self, mime: &str, ext: &str) -> bool {
        mime == MIME_PDF || ext == "pdf"
    }

    fn convert(&self, input: &ConvertInput) -> Result<ConverterOutput, ConvertError> {
        let doc = Document::load_mem(&input.bytes)
            .map_err(|e| ConvertError::corrupt(format!("unreadable PDF: {e}")).with_converter(self.id()))?;

        if doc.is_encrypted() {
            return Err(ConvertError::new(
                ConvertErrorKind::Permission,
                "PDF is encrypted",
            )
            .with_converter(self.id())
            .fatal_for_file());
        }

        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        if pages.is_empty() {
            return Ok(ConverterOutput::new(String::new()).with_warning("PDF has no pages"));
        }

        let text = doc
            .extract_text(&pages)
            .map_err(|e| ConvertError::adapter(format!("PDF text extraction failed: {e}")).with_converter(self.id()))?;

        let mut output = ConverterOutput::new(text);
        if output.markdown.trim().is_empty() {
            output = output.with_warning("PDF contains no extractable text");
        }
        output.title = info_title(&doc);
        Ok(output)
    }
}

/// Best-effort `/Info /Title` lookup.
fn info_title(doc: &Document) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let info_id = info.as_reference().ok()?;
    let dict = doc.get_object(info_id).ok()?.as_dict().ok()?;
    let raw = dict.get(b"Title").ok()?.as_str().ok()?;
    let title = decode_pdf_string(raw);
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// PDF text strings are either PDFDocEncoding (treated as Latin-1-ish
/// UTF-8 here) or UTF-16BE with a BOM.
fn decode_pdf_string(raw: &[u8]) -> String {
    if raw.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = raw[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(raw).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_corrupt() {
        let input = ConvertInput::new("docs/broken.pdf", b"%PDF-not really".to_vec(), MIME_PDF);
        let err = PdfConverter.convert(&input).unwrap_err();
        assert_eq!(err.kind, ConvertErrorKind::Corrupt);
        assert!(err.fatal);
    }

    #[test]
    fn utf16_title_decoding() {
        let raw = [0xFE, 0xFF, 0x00, b'H', 0x00, b'i'];
        assert_eq!(decode_pdf_string(&raw), "Hi");
    }

    #[test]
    fn handles_pdf_mime_and_extension() {
        assert!(PdfConverter.can_handle(MIME_PDF, ""));
        assert!(PdfConverter.can_handle("application/octet-stream", "pdf"));
        assert!(!PdfConverter.can_handle("text/plain", "txt"));
    }
}
