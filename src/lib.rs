//! # docsmith
//!
//! A small document and image conversion service. Clients upload PDFs, Word
//! documents or images, name an operation, and get back a download link for
//! the result.
//!
//! ## Request Flow
//!
//! ```text
//! POST /api/process/{operation}  (multipart)
//!  │
//!  ├─ 1. Decode   identifier → OperationKind (unknown → 400)
//!  ├─ 2. Stage    stream file parts into a per-request temp dir
//!  │              (type allow-list, 50 MiB per file)
//!  ├─ 3. Params   text fields → typed Operation (width, rotationAngle, …)
//!  ├─ 4. Run      lopdf / image / zip+quick-xml on the blocking pool,
//!  │              under a processing timeout
//!  ├─ 5. Publish  content-addressed, atomic write to the output store
//!  └─ 6. Reply    {success, outputPath, downloadUrl}
//!
//! GET /api/download/{filename}  → streamed attachment
//! ```
//!
//! ## Operations
//!
//! | Identifier     | Input        | Output                         |
//! |----------------|--------------|--------------------------------|
//! | `pdf-to-word`  | 1 PDF        | `.docx`, one paragraph per line |
//! | `pdf-to-text`  | 1 PDF        | `.txt` with `Page N:` headers  |
//! | `word-to-pdf`  | 1 `.docx`    | flowed Letter-size PDF         |
//! | `pdf-merge`    | ≥ 2 PDFs     | one PDF, input order           |
//! | `pdf-split`    | 1 PDF        | one PDF per page               |
//! | `image-resize` | 1 image      | JPEG at exactly width × height |
//! | `image-to-pdf` | ≥ 1 image    | one page per image             |
//! | `watermark`    | 1 PDF        | diagonal 30% opacity stamp     |
//! | `rotate`       | 1 PDF        | every page +90/180/270°        |
//! | `pdf-compress` | 1 PDF        | pruned / deflated PDF          |
//! | `pdf-to-jpg`   | 1 PDF        | one JPEG per page (`pdfium`)   |
//! | `protect`      | -            | always unsupported             |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docsmith::{server::Application, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder()
//!         .staging_dir("/var/lib/docsmith/uploads")
//!         .output_dir("/var/lib/docsmith/output")
//!         .build()?;
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `docsmith` binary (clap + anyhow + tracing-subscriber) |
//! | `pdfium` | off     | Real `pdf-to-jpg` via pdfium-render; needs libpdfium at runtime |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dispatch;
pub mod error;
pub mod operation;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{RetentionPolicy, ServiceConfig, ServiceConfigBuilder};
pub use dispatch::Dispatcher;
pub use error::{DocsmithError, Result};
pub use operation::{
    CompressionLevel, FileKind, Operation, OperationKind, OperationParams, RotationAngle,
};
pub use output::OperationResult;
pub use server::{router, AppState, Application};
