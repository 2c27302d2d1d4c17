//! OOXML converters (DOCX, XLSX, PPTX).
//!
//! OOXML containers are zip archives of XML parts. The converters here pull
//! the text runs out of the relevant parts with a streaming XML reader and
//! emit plain markdown paragraphs; visual layout is not reconstructed.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use crate::error::ConvertError;
use crate::mime::{MIME_DOCX, MIME_PPTX, MIME_XLSX};
use crate::registry::Converter;
use crate::types::{ConvertInput, ConverterOutput};

/// Word documents: paragraphs from `word/document.xml`, title from
/// `docProps/core.xml` when present.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxConverter;

impl Converter for DocxConverter {
    fn id(&self) -> &'static str {
        "docx"
    }

    fn version(&self) -> u32 {
        1
    }

    fn can_handle(&self, mime: &str, ext: &str) -> bool {
        mime == MIME_DOCX || ext == "docx"
    }

    fn convert(&self, input: &ConvertInput) -> Result<ConverterOutput, ConvertError> {
        let mut archive = open_archive(&input.bytes, self.id())?;
        let xml = read_part(&mut archive, "word/document.xml", self.id())?;
        let paragraphs = collect_runs(&xml, b"w:t", b"w:p", self.id())?;

        let mut output = ConverterOutput::new(paragraphs.join("\n\n"));
        if output.markdown.trim().is_empty() {
            output = output.with_warning("document contains no text");
        }
        output.title = core_properties_title(&mut archive);
        Ok(output)
    }
}

/// Workbooks: sheet names as headings plus the shared-string table.
///
/// Cell layout is not preserved; the shared strings are listed in table
/// order, which keeps the content searchable without reconstructing grids.
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxConverter;

impl Converter for XlsxConverter {
    fn id(&self) -> &'static str {
        "xlsx"
    }

    fn version(&self) -> u32 {
        1
    }

    fn can_handle(&self, mime: &str, ext: &str) -> bool {
        mime == MIME_XLSX || ext == "xlsx"
    }

    fn convert(&self, input: &ConvertInput) -> Result<ConverterOutput, ConvertError> {
        let mut archive = open_archive(&input.bytes, self.id())?;

        let mut sections: Vec<String> = Vec::new();
        if let Ok(workbook) = read_part(&mut archive, "xl/workbook.xml", self.id()) {
            let names = sheet_names(&workbook, self.id())?;
            for name in names {
                sections.push(format!("## {name}"));
            }
        }

        let mut warnings = Vec::new();
        match read_part(&mut archive, "xl/sharedStrings.xml", self.id()) {
            Ok(xml) => {
                let cells = collect_runs(&xml, b"t", b"si", self.id())?;
                sections.extend(cells);
            }
            Err(_) => warnings.push("workbook has no shared-string table".to_string()),
        }

        let mut output = ConverterOutput::new(sections.join("\n\n"));
        output.warnings = warnings;
        if output.markdown.trim().is_empty() {
            output = output.with_warning("workbook contains no text");
        }
        Ok(output)
    }
}

/// Presentations: one section per slide in slide order.
#[derive(Debug, Default, Clone, Copy)]
pub struct PptxConverter;

impl Converter for PptxConverter {
    fn id(&self) -> &'static str {
        "pptx"
    }

    fn version(&self) -> u32 {
        1
    }

    fn can_handle(&self, mime: &str, ext: &str) -> bool {
        mime == MIME_PPTX || ext == "pptx"
    }

    fn convert(&self, input: &ConvertInput) -> Result<ConverterOutput, ConvertError> {
        let mut archive = open_archive(&input.bytes, self.id())?;

        let mut slide_parts: Vec<(u32, String)> = Vec::new();
        for index in 0..archive.len() {
            let name = archive
                .by_index(index)
                .map_err(|e| ConvertError::corrupt(format!("unreadable archive entry: {e}")))?
                .name()
                .to_string();
            if let Some(number) = slide_number(&name) {
                slide_parts.push((number, name));
            }
        }
        slide_parts.sort_unstable();

        let mut sections: Vec<String> = Vec::new();
        for (number, part) in &slide_parts {
            let xml = read_part(&mut archive, part, self.id())?;
            let runs = collect_runs(&xml, b"a:t", b"a:p", self.id())?;
            if runs.is_empty() {
                continue;
            }
            sections.push(format!("## Slide {number}"));
            sections.extend(runs);
        }

        let mut output = ConverterOutput::new(sections.join("\n\n"));
        if output.markdown.trim().is_empty() {
            output = output.with_warning("presentation contains no text");
        }
        Ok(output)
    }
}

fn open_archive<'a>(bytes: &'a [u8], converter: &str) -> Result<ZipArchive<Cursor<&'a [u8]>>, ConvertError> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ConvertError::corrupt(format!("not an OOXML container: {e}")).with_converter(converter))
}

fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    part: &str,
    converter: &str,
) -> Result<String, ConvertError> {
    let mut entry = archive
        .by_name(part)
        .map_err(|_| ConvertError::corrupt(format!("missing part {part}")).with_converter(converter))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ConvertError::corrupt(format!("unreadable part {part}: {e}")).with_converter(converter))?;
    Ok(xml)
}

/// Collect text runs from `run_tag` elements, grouped by `group_tag`
/// boundaries (paragraphs, shared-string items, ...).
fn collect_runs(
    xml: &str,
    run_tag: &[u8],
    group_tag: &[u8],
    converter: &str,
) -> Result<Vec<String>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut groups: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == run_tag => in_run = true,
            Ok(Event::End(e)) if e.name().as_ref() == run_tag => in_run = false,
            Ok(Event::End(e)) if e.name().as_ref() == group_tag => {
                let text = current.trim();
                if !text.is_empty() {
                    groups.push(text.to_string());
                }
                current.clear();
            }
            Ok(Event::Text(t)) if in_run => {
                let text = t
                    .unescape()
                    .map_err(|e| ConvertError::adapter(format!("bad XML text: {e}")).with_converter(converter))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(
                    ConvertError::adapter(format!("XML parse error: {e}")).with_converter(converter)
                )
            }
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        groups.push(tail.to_string());
    }
    Ok(groups)
}

/// Sheet names from `xl/workbook.xml` `<sheet name="..."/>` attributes.
fn sheet_names(xml: &str, converter: &str) -> Result<Vec<String>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut names = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"sheet" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"name" {
                        if let Ok(value) = attr.unescape_value() {
                            names.push(value.into_owned());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(
                    ConvertError::adapter(format!("XML parse error: {e}")).with_converter(converter)
                )
            }
        }
    }
    Ok(names)
}

/// `ppt/slides/slide7.xml` → `Some(7)`.
fn slide_number(part: &str) -> Option<u32> {
    let rest = part.strip_prefix("ppt/slides/slide")?;
    let digits = rest.strip_suffix(".xml")?;
    digits.parse().ok()
}

/// `docProps/core.xml` `<dc:title>` when present and non-empty.
fn core_properties_title(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Option<String> {
    let mut entry = archive.by_name("docProps/core.xml").ok()?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml).ok()?;

    let mut reader = Reader::from_str(&xml);
    let mut in_title = false;
    let mut title = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"dc:title" => in_title = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"dc:title" => break,
            Ok(Event::Text(t)) if in_title => title.push_str(&t.unescape().ok()?),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}
