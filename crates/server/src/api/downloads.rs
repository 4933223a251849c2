//! Download job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use tubeline_core::{DispatchError, JobError, JobProgress, JobSnapshot, JobStatus, ProviderSlot};

use crate::state::AppState;

/// Maximum allowed limit for history queries
const MAX_LIMIT: usize = 1000;

/// Default limit for history queries
const DEFAULT_LIMIT: usize = 50;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a download
#[derive(Debug, Deserialize)]
pub struct StartDownloadBody {
    pub url: String,
}

/// Response for an accepted download
#[derive(Debug, Serialize)]
pub struct StartDownloadResponse {
    pub job_id: String,
}

/// Query parameters for the history endpoint
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// A job as returned to clients
#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub id: String,
    pub url: String,
    pub status: JobStatus,
    pub provider: ProviderSlot,
    pub attempt: u32,
    pub progress: JobProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Where the finished file can be fetched from this server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<JobSnapshot> for DownloadResponse {
    fn from(job: JobSnapshot) -> Self {
        let (title, file_url) = match &job.result {
            Some(result) => (
                Some(result.title.clone()),
                result
                    .file_path
                    .file_name()
                    .map(|name| {
                        format!("/files/{}", urlencoding::encode(&name.to_string_lossy()))
                    }),
            ),
            None => (None, None),
        };
        Self {
            id: job.id,
            url: job.url,
            status: job.status,
            provider: job.provider,
            attempt: job.attempt,
            progress: job.progress,
            title,
            file_url,
            error: job.error,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

/// Response for listing downloads
#[derive(Debug, Serialize)]
pub struct ListDownloadsResponse {
    pub downloads: Vec<DownloadResponse>,
    pub total: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct DownloadErrorResponse {
    pub error: String,
}

fn error_response(
    status: StatusCode,
    error: impl ToString,
) -> (StatusCode, Json<DownloadErrorResponse>) {
    (
        status,
        Json(DownloadErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn dispatch_error_status(error: &DispatchError) -> StatusCode {
    match error {
        DispatchError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        DispatchError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
        DispatchError::AlreadyFinished(_) => StatusCode::CONFLICT,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a download; the job runs in the background.
pub async fn start_download(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartDownloadBody>,
) -> Result<(StatusCode, Json<StartDownloadResponse>), impl IntoResponse> {
    match state.dispatcher().start(&body.url) {
        Ok(job_id) => Ok((StatusCode::ACCEPTED, Json(StartDownloadResponse { job_id }))),
        Err(e) => Err(error_response(dispatch_error_status(&e), e)),
    }
}

/// List all jobs in submission order
pub async fn list_downloads(State(state): State<Arc<AppState>>) -> Json<ListDownloadsResponse> {
    let downloads: Vec<DownloadResponse> = state
        .dispatcher()
        .list()
        .into_iter()
        .map(DownloadResponse::from)
        .collect();
    Json(ListDownloadsResponse {
        total: downloads.len(),
        downloads,
    })
}

/// Get a job by ID
pub async fn get_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DownloadResponse>, impl IntoResponse> {
    match state.dispatcher().status(&id) {
        Ok(job) => Ok(Json(DownloadResponse::from(job))),
        Err(e) => Err(error_response(dispatch_error_status(&e), e)),
    }
}

/// Request cancellation of a job
pub async fn cancel_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, impl IntoResponse> {
    match state.dispatcher().cancel(&id) {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(e) => Err(error_response(dispatch_error_status(&e), e)),
    }
}

/// Most recently finished jobs from the history store
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ListDownloadsResponse>, impl IntoResponse> {
    let Some(history) = state.dispatcher().history() else {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            "job history is not enabled",
        ));
    };

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let jobs = match history.recent(limit) {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!(error = %e, "Failed to read job history");
            return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e));
        }
    };
    let total = match history.count() {
        Ok(total) => total as usize,
        Err(e) => return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    };

    Ok(Json(ListDownloadsResponse {
        downloads: jobs.into_iter().map(DownloadResponse::from).collect(),
        total,
    }))
}
