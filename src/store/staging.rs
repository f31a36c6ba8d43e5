//! Staging store: where uploads land while a request is being processed.
//!
//! Every request gets its own directory under the staging root. The
//! directory is a [`tempfile::TempDir`], so it is removed when the request's
//! [`RequestStage`] is dropped, whether the request succeeded, failed
//! validation halfway through an upload, or was cancelled by the client.

use crate::error::{DocsmithError, Result};
use crate::operation::FileKind;
use crate::pipeline::input::Input;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

const MAX_NAME_LEN: usize = 100;

/// Reduce a client-supplied filename to a single safe path component.
///
/// Directory parts are dropped, anything outside `[A-Za-z0-9._-]` becomes
/// `_`, and leading dots are stripped so the result can never be `..` or a
/// hidden file.
pub fn sanitize_file_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original);
    let cleaned = UNSAFE_CHARS.replace_all(base, "_");
    let trimmed = cleaned.trim_start_matches('.');
    let mut name: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    if name.is_empty() || name.chars().all(|c| c == '_') {
        name = "upload".to_string();
    }
    name
}

/// An upload that has been fully written to staging.
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// Name as sent by the client (unsanitised, for messages only).
    pub original_name: String,
    pub content_type: String,
    pub kind: FileKind,
    pub size: u64,
    pub path: PathBuf,
}

impl StagedFile {
    pub fn as_input(&self) -> Input {
        Input::new(&self.original_name, &self.path)
    }
}

/// Root of the staging store.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root if needed.
    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| DocsmithError::io(&self.root, e))
    }

    /// Open a private directory for one request.
    pub fn begin(&self) -> Result<RequestStage> {
        let dir = tempfile::Builder::new()
            .prefix("req-")
            .tempdir_in(&self.root)
            .map_err(|e| DocsmithError::io(&self.root, e))?;
        debug!("Opened staging directory {}", dir.path().display());
        Ok(RequestStage {
            dir,
            files: Vec::new(),
        })
    }

    /// Number of files currently staged across all in-flight requests.
    pub async fn count_files(&self) -> Result<usize> {
        let mut count = 0;
        let mut dirs = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| DocsmithError::io(&self.root, e))?;
        while let Some(entry) = dirs
            .next_entry()
            .await
            .map_err(|e| DocsmithError::io(&self.root, e))?
        {
            let Ok(mut files) = tokio::fs::read_dir(entry.path()).await else {
                continue;
            };
            while let Ok(Some(_)) = files.next_entry().await {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// One request's staging directory and the files accepted into it so far.
#[derive(Debug)]
pub struct RequestStage {
    dir: TempDir,
    files: Vec<StagedFile>,
}

impl RequestStage {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    /// Where to write an upload: `{unix_millis}_{sanitised name}`, with a
    /// counter appended on collision.
    pub fn allocate(&self, original_name: &str) -> PathBuf {
        let stamp = Utc::now().timestamp_millis();
        let name = sanitize_file_name(original_name);
        let mut candidate = self.dir.path().join(format!("{stamp}_{name}"));
        let mut n = 1;
        while candidate.exists() {
            candidate = self.dir.path().join(format!("{stamp}_{n}_{name}"));
            n += 1;
        }
        candidate
    }

    /// Record a file that has been completely written.
    pub fn accept(&mut self, file: StagedFile) {
        debug!(
            "Staged '{}' ({} bytes, {})",
            file.original_name, file.size, file.content_type
        );
        self.files.push(file);
    }

    /// Stage an in-memory file. Used by the CLI and tests; HTTP uploads are
    /// streamed to [`Self::allocate`]d paths instead.
    pub async fn stage_bytes(
        &mut self,
        original_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<&StagedFile> {
        let kind = FileKind::from_mime(content_type).ok_or_else(|| DocsmithError::InvalidFileType {
            file_name: original_name.to_string(),
            content_type: content_type.to_string(),
        })?;
        let path = self.allocate(original_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| DocsmithError::io(&path, e))?;
        self.accept(StagedFile {
            original_name: original_name.to_string(),
            content_type: content_type.to_string(),
            kind,
            size: bytes.len() as u64,
            path,
        });
        Ok(&self.files[self.files.len() - 1])
    }
}
