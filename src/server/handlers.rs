use super::{upload, AppState};
use crate::error::Result;
use crate::operation::{Operation, OperationKind};
use crate::output::OperationResult;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::info;

/// Number of names listed by `/api/files/recent`.
pub const RECENT_LIMIT: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFiles {
    pub processed_files: usize,
    pub uploaded_files: usize,
    pub recent_files: Vec<String>,
}

/// `POST /api/process/{operation}`
///
/// The identifier is checked before the body is read, so an unknown
/// operation never touches the staging store.
pub async fn process(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<OperationResult>> {
    let kind: OperationKind = operation.parse()?;

    let mut stage = state.staging.begin()?;
    let params = upload::receive(&mut multipart, &mut stage, state.upload_limits()).await?;
    let operation = Operation::decode(kind, &params)?;
    let result = state.dispatcher.dispatch(operation, stage.files()).await?;

    info!("{} → {}", kind, result.output_path);
    Ok(Json(result))
}

/// `GET /api/download/{filename}`
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response> {
    let (file, len) = state.output().open(&filename).await?;
    let mime = mime_guess::from_path(&filename).first_or_octet_stream();
    let headers = [
        (header::CONTENT_TYPE, mime.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
        (header::CONTENT_LENGTH, len.to_string()),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// `GET /api/health`
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "OK".into(),
        message: "docsmith is running".into(),
    })
}

/// `GET /api/files/recent`
pub async fn recent(State(state): State<AppState>) -> Result<Json<RecentFiles>> {
    let (outputs, uploaded_files) =
        futures::try_join!(state.output().list(), state.staging.count_files())?;
    Ok(Json(RecentFiles {
        processed_files: outputs.len(),
        uploaded_files,
        recent_files: outputs
            .into_iter()
            .take(RECENT_LIMIT)
            .map(|f| f.name)
            .collect(),
    }))
}
