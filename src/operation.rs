//! Operation identifiers and their typed parameter sets.
//!
//! The HTTP layer receives an identifier string plus loose form fields.
//! [`OperationKind`] is the closed set of identifiers; [`Operation`] is a
//! kind together with its parsed, validated parameters. Decoding happens
//! once, at the boundary, so the dispatcher only ever sees well-formed work.

use crate::error::DocsmithError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Every operation identifier the service recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    PdfToWord,
    PdfToText,
    WordToPdf,
    PdfMerge,
    PdfSplit,
    ImageResize,
    ImageToPdf,
    Watermark,
    Rotate,
    PdfCompress,
    Protect,
    PdfToJpg,
}

impl OperationKind {
    pub const ALL: [OperationKind; 12] = [
        Self::PdfToWord,
        Self::PdfToText,
        Self::WordToPdf,
        Self::PdfMerge,
        Self::PdfSplit,
        Self::ImageResize,
        Self::ImageToPdf,
        Self::Watermark,
        Self::Rotate,
        Self::PdfCompress,
        Self::Protect,
        Self::PdfToJpg,
    ];

    /// The identifier used in `/api/process/{operation}`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PdfToWord => "pdf-to-word",
            Self::PdfToText => "pdf-to-text",
            Self::WordToPdf => "word-to-pdf",
            Self::PdfMerge => "pdf-merge",
            Self::PdfSplit => "pdf-split",
            Self::ImageResize => "image-resize",
            Self::ImageToPdf => "image-to-pdf",
            Self::Watermark => "watermark",
            Self::Rotate => "rotate",
            Self::PdfCompress => "pdf-compress",
            Self::Protect => "protect",
            Self::PdfToJpg => "pdf-to-jpg",
        }
    }

    /// What kind of file every input must be.
    pub fn input_kind(&self) -> FileKind {
        match self {
            Self::WordToPdf => FileKind::Word,
            Self::ImageResize | Self::ImageToPdf => FileKind::Image,
            _ => FileKind::Pdf,
        }
    }

    /// How many input files the operation accepts.
    pub fn arity(&self) -> InputArity {
        match self {
            Self::PdfMerge => InputArity::AtLeast(2),
            Self::ImageToPdf => InputArity::AtLeast(1),
            _ => InputArity::Single,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = DocsmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DocsmithError::UnsupportedOperation {
                operation: s.to_string(),
                reason: "unknown operation identifier".into(),
            })
    }
}

/// Number of files an operation takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputArity {
    Single,
    AtLeast(usize),
}

impl InputArity {
    /// Check a received file count against this arity.
    pub fn check(&self, op: OperationKind, count: usize) -> Result<(), DocsmithError> {
        match *self {
            InputArity::Single if count == 0 => Err(DocsmithError::MissingInput(format!(
                "{op} needs one file in the 'file' field"
            ))),
            InputArity::Single if count > 1 => Err(DocsmithError::InvalidParameter {
                name: "file".into(),
                reason: format!("{op} takes exactly one file, got {count}"),
            }),
            InputArity::AtLeast(min) if count < min => Err(DocsmithError::MissingInput(format!(
                "{op} needs at least {min} files in the 'files' field, got {count}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Coarse classification of an accepted upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Word,
    Image,
}

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";
pub const MIME_GIF: &str = "image/gif";

impl FileKind {
    /// Classify a declared content type; `None` means it is not on the allow-list.
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            MIME_PDF => Some(Self::Pdf),
            MIME_DOCX => Some(Self::Word),
            MIME_JPEG | MIME_PNG | MIME_GIF => Some(Self::Image),
            _ => None,
        }
    }
}

/// Raw form fields that accompanied an upload.
#[derive(Debug, Clone, Default)]
pub struct OperationParams(HashMap<String, String>);

impl OperationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// A field counts as present only if it is non-blank.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &str, op: OperationKind) -> Result<&str, DocsmithError> {
        self.get(name)
            .ok_or_else(|| DocsmithError::MissingInput(format!("{op} needs the '{name}' field")))
    }
}

/// Page rotation accepted by `rotate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationAngle {
    Deg90,
    Deg180,
    Deg270,
}

impl RotationAngle {
    pub fn degrees(&self) -> i64 {
        match self {
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }
}

impl FromStr for RotationAngle {
    type Err = DocsmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "90" => Ok(Self::Deg90),
            "180" => Ok(Self::Deg180),
            "270" => Ok(Self::Deg270),
            other => Err(DocsmithError::InvalidParameter {
                name: "rotationAngle".into(),
                reason: format!("expected 90, 180 or 270, got '{other}'"),
            }),
        }
    }
}

/// Compaction effort for `pdf-compress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Drop unreachable objects only.
    Low,
    /// Low + deflate every uncompressed stream. (default)
    #[default]
    Medium,
    /// Medium + drop empty streams and renumber objects densely.
    High,
}

impl FromStr for CompressionLevel {
    type Err = DocsmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(DocsmithError::InvalidParameter {
                name: "compressionLevel".into(),
                reason: format!("expected low, medium or high, got '{other}'"),
            }),
        }
    }
}

/// Text stamped by `watermark` when the caller supplies none.
pub const DEFAULT_WATERMARK_TEXT: &str = "WATERMARK";

/// Largest edge accepted by `image-resize`.
pub const MAX_RESIZE_EDGE: u32 = 16_384;

/// Largest output area accepted by `image-resize`, in pixels (40 MP).
pub const MAX_RESIZE_PIXELS: u64 = 40_000_000;

/// A fully decoded operation, ready for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    PdfToWord,
    PdfToText,
    WordToPdf,
    PdfMerge,
    PdfSplit,
    ImageResize { width: u32, height: u32 },
    ImageToPdf,
    Watermark { text: String },
    Rotate { angle: RotationAngle },
    PdfCompress { level: CompressionLevel },
    PdfToJpg,
}

impl Operation {
    /// Decode an identifier and its form fields.
    ///
    /// `protect` always fails with [`DocsmithError::UnsupportedOperation`];
    /// `pdf-to-jpg` does too unless the crate was built with `pdfium`.
    pub fn decode(kind: OperationKind, params: &OperationParams) -> Result<Self, DocsmithError> {
        Ok(match kind {
            OperationKind::PdfToWord => Self::PdfToWord,
            OperationKind::PdfToText => Self::PdfToText,
            OperationKind::WordToPdf => Self::WordToPdf,
            OperationKind::PdfMerge => Self::PdfMerge,
            OperationKind::PdfSplit => Self::PdfSplit,
            OperationKind::ImageToPdf => Self::ImageToPdf,
            OperationKind::ImageResize => {
                let width = parse_edge(params.require("width", kind)?, "width")?;
                let height = parse_edge(params.require("height", kind)?, "height")?;
                if u64::from(width) * u64::from(height) > MAX_RESIZE_PIXELS {
                    return Err(DocsmithError::InvalidParameter {
                        name: "width".into(),
                        reason: format!(
                            "{width}x{height} exceeds the {MAX_RESIZE_PIXELS}-pixel output limit"
                        ),
                    });
                }
                Self::ImageResize { width, height }
            }
            OperationKind::Watermark => Self::Watermark {
                text: params
                    .get("watermarkText")
                    .unwrap_or(DEFAULT_WATERMARK_TEXT)
                    .to_string(),
            },
            OperationKind::Rotate => Self::Rotate {
                angle: params.require("rotationAngle", kind)?.parse()?,
            },
            OperationKind::PdfCompress => Self::PdfCompress {
                level: params
                    .get("compressionLevel")
                    .map(str::parse::<CompressionLevel>)
                    .transpose()?
                    .unwrap_or_default(),
            },
            OperationKind::Protect => {
                return Err(DocsmithError::UnsupportedOperation {
                    operation: kind.to_string(),
                    reason: "PDF password protection is not implemented".into(),
                })
            }
            OperationKind::PdfToJpg => {
                if !cfg!(feature = "pdfium") {
                    return Err(DocsmithError::UnsupportedOperation {
                        operation: kind.to_string(),
                        reason: "page rasterisation requires a build with the 'pdfium' feature"
                            .into(),
                    });
                }
                Self::PdfToJpg
            }
        })
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::PdfToWord => OperationKind::PdfToWord,
            Self::PdfToText => OperationKind::PdfToText,
            Self::WordToPdf => OperationKind::WordToPdf,
            Self::PdfMerge => OperationKind::PdfMerge,
            Self::PdfSplit => OperationKind::PdfSplit,
            Self::ImageResize { .. } => OperationKind::ImageResize,
            Self::ImageToPdf => OperationKind::ImageToPdf,
            Self::Watermark { .. } => OperationKind::Watermark,
            Self::Rotate { .. } => OperationKind::Rotate,
            Self::PdfCompress { .. } => OperationKind::PdfCompress,
            Self::PdfToJpg => OperationKind::PdfToJpg,
        }
    }
}

fn parse_edge(value: &str, name: &str) -> Result<u32, DocsmithError> {
    let invalid = |reason: String| DocsmithError::InvalidParameter {
        name: name.to_string(),
        reason,
    };
    let n: u32 = value
        .parse()
        .map_err(|_| invalid(format!("expected a positive integer, got '{value}'")))?;
    if n == 0 || n > MAX_RESIZE_EDGE {
        return Err(invalid(format!("must be between 1 and {MAX_RESIZE_EDGE}, got {n}")));
    }
    Ok(n)
}
