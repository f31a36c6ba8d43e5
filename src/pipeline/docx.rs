//! Minimal WordprocessingML: raw text out of a `.docx`, and a `.docx` with
//! one paragraph per line of text.
//!
//! Only `word/document.xml` is read. Styles, numbering, headers, footers,
//! tables-as-layout and images are ignored; table cell text still comes
//! through because it lives in ordinary `w:p` elements.

use crate::error::{DocsmithError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DOCUMENT_PART: &str = "word/document.xml";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

// Letter, 1" margins, in twentieths of a point.
const DOCUMENT_TAIL: &str = r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr></w:body></w:document>"#;

/// Largest `word/document.xml` accepted, once inflated.
pub const MAX_DOCUMENT_PART_BYTES: u64 = 64 * 1024 * 1024;

/// Raw text of a `.docx`: one line per paragraph, `w:tab` as a tab and
/// `w:br` as a line break.
pub fn read_text(bytes: &[u8]) -> Result<String> {
    read_text_within(bytes, MAX_DOCUMENT_PART_BYTES)
}

fn read_text_within(bytes: &[u8], limit: u64) -> Result<String> {
    let too_large = || {
        DocsmithError::Processing(format!(
            "{DOCUMENT_PART} inflates to more than {limit} bytes"
        ))
    };

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let part = archive.by_name(DOCUMENT_PART).map_err(|_| {
        DocsmithError::Processing(format!("not a Word document: missing {DOCUMENT_PART}"))
    })?;
    if part.size() > limit {
        return Err(too_large());
    }
    // The declared size can lie; never read past the limit regardless.
    let mut xml = String::new();
    part.take(limit + 1)
        .read_to_string(&mut xml)
        .map_err(|e| DocsmithError::processing(DOCUMENT_PART, e))?;
    if xml.len() as u64 > limit {
        return Err(too_large());
    }

    let text = paragraph_text(&xml)?;
    debug!("Read {} chars of text from .docx", text.len());
    Ok(text)
}

fn paragraph_text(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" | b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => out.push_str(
                &t.unescape()
                    .map_err(|e| DocsmithError::processing(DOCUMENT_PART, e))?,
            ),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn part_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// XML 1.0 forbids most control characters, even escaped.
fn xml_safe(text: &str) -> String {
    text.chars()
        .filter(|&c| c == '\t' || c >= ' ')
        .collect()
}

/// A `.docx` with one paragraph per entry.
pub fn write_paragraphs<S: AsRef<str>>(paragraphs: &[S]) -> Result<Vec<u8>> {
    let mut body = String::from(DOCUMENT_HEAD);
    for paragraph in paragraphs {
        let text = xml_safe(paragraph.as_ref());
        body.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
        body.push_str(&quick_xml::escape::escape(text.as_str()));
        body.push_str("</w:t></w:r></w:p>");
    }
    body.push_str(DOCUMENT_TAIL);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", PACKAGE_RELS),
        (DOCUMENT_PART, body.as_str()),
    ] {
        zip.start_file(name, part_options())?;
        zip.write_all(content.as_bytes())
            .map_err(|e| DocsmithError::processing(name, e))?;
    }
    let cursor = zip.finish()?;
    debug!("Wrote .docx with {} paragraphs", paragraphs.len());
    Ok(cursor.into_inner())
}
