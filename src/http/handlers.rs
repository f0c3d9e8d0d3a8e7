use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::files::{FileChunk, FileEntry, FilesError};
use crate::http::server::AppState;
use crate::master::{MasterError, MasterState};

#[derive(Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub pid: String,
    pub leader: bool,
}

#[derive(Debug, Deserialize)]
pub struct BrowseParams {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ReadParams {
    pub path: String,
    pub offset: Option<u64>,
    pub length: Option<u64>,
}

/// Error body: `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Files(FilesError),
    Master(MasterError),
}

impl From<FilesError> for ApiError {
    fn from(e: FilesError) -> Self {
        ApiError::Files(e)
    }
}

impl From<MasterError> for ApiError {
    fn from(e: MasterError) -> Self {
        ApiError::Master(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Files(e) => {
                let status = match &e {
                    FilesError::NotFound(_) => StatusCode::NOT_FOUND,
                    FilesError::InvalidPath(_)
                    | FilesError::IsDirectory(_)
                    | FilesError::NotDirectory(_) => StatusCode::BAD_REQUEST,
                    FilesError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                        StatusCode::NOT_FOUND
                    }
                    FilesError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::Master(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub async fn get_health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        pid: state.master.pid().to_string(),
        leader: state.master.is_leading(),
    })
}

pub async fn get_state(State(state): State<AppState>) -> Result<Json<MasterState>, ApiError> {
    Ok(Json(state.master.state().await?))
}

pub async fn browse_files(
    State(state): State<AppState>,
    Query(params): Query<BrowseParams>,
) -> Result<Json<Vec<FileEntry>>, ApiError> {
    Ok(Json(state.files.browse(&params.path).await?))
}

pub async fn read_file(
    State(state): State<AppState>,
    Query(params): Query<ReadParams>,
) -> Result<Json<FileChunk>, ApiError> {
    let chunk = state
        .files
        .read(&params.path, params.offset, params.length)
        .await?;
    Ok(Json(chunk))
}

pub async fn get_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics recorder not installed").into_response(),
    }
}
