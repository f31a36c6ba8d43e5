//! Input checks: read a staged file and make sure it is what the operation
//! expects before handing it to a library.
//!
//! The declared content type only tells us what the browser claimed. A PNG
//! renamed to `.pdf` would otherwise reach lopdf and come back as an opaque
//! parser error, so we sniff magic bytes first and report which file was
//! wrong.

use crate::error::{DocsmithError, Result};
use lopdf::Document;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A staged file as seen by the pipeline: the caller's name for it plus
/// where it lives on disk.
#[derive(Debug, Clone)]
pub struct Input {
    pub name: String,
    pub path: PathBuf,
}

impl Input {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| DocsmithError::io(&self.path, e))
    }
}

/// PDF readers accept the header anywhere in the first KiB.
const PDF_HEADER_WINDOW: usize = 1024;

/// Check for the `%PDF` header.
pub fn is_pdf(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    window.windows(4).any(|w| w == b"%PDF")
}

/// `.docx` files are zip archives.
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04")
}

fn magic(bytes: &[u8]) -> String {
    let head = &bytes[..bytes.len().min(4)];
    format!("{head:?}")
}

/// Read and parse a PDF input.
pub fn load_pdf(input: &Input) -> Result<Document> {
    let bytes = input.read()?;
    parse_pdf(&input.name, &bytes)
}

/// Parse PDF bytes, refusing non-PDFs and encrypted documents.
pub fn parse_pdf(name: &str, bytes: &[u8]) -> Result<Document> {
    if !is_pdf(bytes) {
        return Err(DocsmithError::Processing(format!(
            "'{name}' is not a valid PDF (first bytes: {})",
            magic(bytes)
        )));
    }
    let doc = Document::load_mem(bytes)
        .map_err(|e| DocsmithError::processing(&format!("'{name}' is corrupt"), e))?;
    if doc.is_encrypted() {
        return Err(DocsmithError::Processing(format!(
            "'{name}' is encrypted; password-protected PDFs are not supported"
        )));
    }
    debug!("Loaded PDF '{}': {} pages", name, doc.get_pages().len());
    Ok(doc)
}

/// Read a `.docx` input.
pub fn load_docx(input: &Input) -> Result<Vec<u8>> {
    let bytes = input.read()?;
    if !is_zip(&bytes) {
        return Err(DocsmithError::Processing(format!(
            "'{}' is not a .docx document (first bytes: {})",
            input.name,
            magic(&bytes)
        )));
    }
    Ok(bytes)
}

/// Read an image input; decoding is left to [`crate::pipeline::image`].
pub fn load_image(input: &Input) -> Result<Vec<u8>> {
    let bytes = input.read()?;
    ::image::guess_format(&bytes).map_err(|_| {
        DocsmithError::Processing(format!(
            "'{}' is not a supported image (first bytes: {})",
            input.name,
            magic(&bytes)
        ))
    })?;
    Ok(bytes)
}

/// Display helper for log lines.
pub fn describe(inputs: &[Input]) -> String {
    inputs
        .iter()
        .map(|i| i.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// An input for a local file, named after its last path component.
pub fn from_path(path: &Path) -> Input {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Input::new(name, path)
}
