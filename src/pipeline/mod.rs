//! Library-backed stages used by the dispatcher.
//!
//! Each submodule wraps one family of third-party calls. All functions here
//! are synchronous and CPU-bound; the dispatcher runs them inside
//! `spawn_blocking`.
//!
//! ## Data Flow
//!
//! ```text
//! staged file ──▶ input ──▶ pdf / docx / image / compose / render ──▶ bytes
//!  (path)        (magic)        (lopdf, zip+quick-xml, image, pdfium)
//! ```
//!
//! 1. [`input`]: read a staged file and check it really is what the
//!    operation expects (`%PDF`, zip signature, decodable image)
//! 2. [`pdf`]: page-level edits on existing PDFs: merge, split, rotate,
//!    watermark, compaction, text extraction
//! 3. [`compose`]: build new PDFs from plain text or images
//! 4. [`docx`]: read raw text out of, and write text into, `.docx`
//! 5. [`image`]: exact resize and JPEG encoding
//! 6. [`render`]: pdfium page rasterisation (`pdfium` feature only)

pub mod compose;
pub mod docx;
pub mod image;
pub mod input;
pub mod pdf;
#[cfg(feature = "pdfium")]
pub mod render;
