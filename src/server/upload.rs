//! Multipart ingestion: stream file parts into a request's staging
//! directory and collect text parts as operation parameters.
//!
//! Each file part is checked against the content-type allow-list before a
//! single byte is written, and against the size limit while it streams in.
//! A part that trips the limit is deleted immediately; everything else the
//! request staged disappears with its [`RequestStage`].

use crate::error::{DocsmithError, Result};
use crate::operation::{FileKind, OperationParams};
use crate::store::{RequestStage, StagedFile};
use axum::extract::multipart::{Field, Multipart};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Upload limits for one request.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_file_bytes: u64,
    pub max_files: usize,
}

/// Longest accepted text field, in bytes.
const MAX_FIELD_BYTES: usize = 8 * 1024;

fn malformed(e: impl std::fmt::Display) -> DocsmithError {
    DocsmithError::InvalidParameter {
        name: "body".into(),
        reason: format!("malformed multipart data: {e}"),
    }
}

/// Drain `multipart` into `stage`, returning the text fields.
pub async fn receive(
    multipart: &mut Multipart,
    stage: &mut RequestStage,
    limits: UploadLimits,
) -> Result<OperationParams> {
    let mut params = OperationParams::new();

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or("").to_string();
        if field.file_name().is_some() || name == "file" || name == "files" {
            if stage.files().len() >= limits.max_files {
                return Err(DocsmithError::InvalidParameter {
                    name,
                    reason: format!("at most {} files per request", limits.max_files),
                });
            }
            let staged = stream_file(field, stage, limits.max_file_bytes).await?;
            stage.accept(staged);
        } else {
            let value = read_text(field, &name).await?;
            debug!("Form field {} = {:?}", name, value);
            params.insert(name, value);
        }
    }
    Ok(params)
}

async fn stream_file(
    mut field: Field<'_>,
    stage: &RequestStage,
    max_bytes: u64,
) -> Result<StagedFile> {
    let original_name = field.file_name().unwrap_or("upload").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let kind = FileKind::from_mime(&content_type).ok_or_else(|| DocsmithError::InvalidFileType {
        file_name: original_name.clone(),
        content_type: content_type.clone(),
    })?;

    let path = stage.allocate(&original_name);
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| DocsmithError::io(&path, e))?;

    let mut size: u64 = 0;
    let outcome: Result<()> = async {
        while let Some(chunk) = field.chunk().await.map_err(malformed)? {
            size += chunk.len() as u64;
            if size > max_bytes {
                return Err(DocsmithError::PayloadTooLarge {
                    file_name: original_name.clone(),
                    limit: max_bytes,
                });
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| DocsmithError::io(&path, e))?;
        }
        file.flush().await.map_err(|e| DocsmithError::io(&path, e))
    }
    .await;

    if let Err(e) = outcome {
        drop(file);
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e);
    }

    Ok(StagedFile {
        original_name,
        content_type,
        kind,
        size,
        path,
    })
}

async fn read_text(mut field: Field<'_>, name: &str) -> Result<String> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(malformed)? {
        if buf.len() + chunk.len() > MAX_FIELD_BYTES {
            return Err(DocsmithError::InvalidParameter {
                name: name.to_string(),
                reason: format!("longer than {MAX_FIELD_BYTES} bytes"),
            });
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf).map_err(|_| DocsmithError::InvalidParameter {
        name: name.to_string(),
        reason: "not valid UTF-8".into(),
    })
}
