//! Output store: a flat directory of produced files awaiting download.
//!
//! Names are `{unix_millis}_{sha256[..12]}_{label}.{ext}`, the hash taken
//! over the file content. Every write creates its own file: if identical
//! bytes were already stored under that name in the same millisecond, the
//! write takes `{unix_millis}_{sha256[..12]}-{n}_{label}.{ext}` instead, so
//! one request rolling back never removes a file another request returned.
//! Writes go to a dot-prefixed temp file first and are moved into place
//! without replacing anything, so a download never observes a half-written
//! file.

use crate::error::{DocsmithError, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Hex characters of the content hash kept in a name.
const HASH_PREFIX_LEN: usize = 12;

/// Suffixed names tried before a write gives up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Handle to the output directory. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

/// A listing entry for `/api/files/recent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// True when `name` is one plain path component that the store could have
/// produced: no separators, no `..`, no hidden or temp files.
pub fn is_plain_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

impl OutputStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if needed.
    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DocsmithError::io(&self.dir, e))
    }

    /// Content-addressed name for `bytes`.
    pub fn name_for(label: &str, ext: &str, bytes: &[u8]) -> String {
        Self::candidate(&Self::stem_for(bytes), 0, label, ext)
    }

    fn stem_for(bytes: &[u8]) -> String {
        let digest = hex::encode(Sha256::digest(bytes));
        format!(
            "{}_{}",
            Utc::now().timestamp_millis(),
            &digest[..HASH_PREFIX_LEN]
        )
    }

    fn candidate(stem: &str, attempt: u32, label: &str, ext: &str) -> String {
        match attempt {
            0 => format!("{stem}_{label}.{ext}"),
            n => format!("{stem}-{n}_{label}.{ext}"),
        }
    }

    /// Atomically write a produced file; returns its store name. The name
    /// is new: an existing file is never replaced.
    ///
    /// Blocking: called from the dispatcher's worker thread.
    pub fn write(&self, label: &str, ext: &str, bytes: &[u8]) -> Result<String> {
        let stem = Self::stem_for(bytes);
        let mut tmp = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(&self.dir)
            .map_err(|e| DocsmithError::io(&self.dir, e))?;
        tmp.write_all(bytes)
            .map_err(|e| DocsmithError::io(tmp.path(), e))?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = Self::candidate(&stem, attempt, label, ext);
            let final_path = self.dir.join(&name);
            match tmp.persist_noclobber(&final_path) {
                Ok(_) => {
                    debug!("Wrote output {} ({} bytes)", name, bytes.len());
                    return Ok(name);
                }
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!("Output name {} taken, trying the next", name);
                    tmp = e.file;
                }
                Err(e) => return Err(DocsmithError::io(&final_path, e.error)),
            }
        }
        Err(DocsmithError::Internal(format!(
            "no free output name for {stem}_{label}.{ext}"
        )))
    }

    /// Best-effort removal, for rolling back a failed operation.
    pub fn discard(&self, name: &str) {
        if !is_plain_name(name) {
            return;
        }
        let path = self.dir.join(name);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Could not remove partial output {}: {}", path.display(), e);
        }
    }

    /// Resolve a download name to a path inside the store.
    pub fn locate(&self, name: &str) -> Result<PathBuf> {
        if !is_plain_name(name) {
            return Err(DocsmithError::NotFound(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    /// Open a stored file for streaming, returning it with its length.
    pub async fn open(&self, name: &str) -> Result<(tokio::fs::File, u64)> {
        let path = self.locate(name)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocsmithError::NotFound(name.to_string()))
            }
            Err(e) => return Err(DocsmithError::io(&path, e)),
        };
        let meta = file
            .metadata()
            .await
            .map_err(|e| DocsmithError::io(&path, e))?;
        if !meta.is_file() {
            return Err(DocsmithError::NotFound(name.to_string()));
        }
        Ok((file, meta.len()))
    }

    /// Every finished file, newest first.
    pub async fn list(&self) -> Result<Vec<StoredFile>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| DocsmithError::io(&self.dir, e))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DocsmithError::io(&self.dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_plain_name(&name) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            files.push(StoredFile {
                name,
                size: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
        Ok(files)
    }
}
