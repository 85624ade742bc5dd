//! Request handlers for the control API.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::error;

use crate::error::ScrapeError;
use crate::export;
use crate::models::SessionStatus;

use super::AppState;

/// JSON error envelope; the status code follows the error taxonomy.
pub struct ApiError(ScrapeError);

impl From<ScrapeError> for ApiError {
    fn from(e: ScrapeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ScrapeError::NotFound(_) => StatusCode::NOT_FOUND,
            ScrapeError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ScrapeError::Provisioning(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {}", self.0);
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub job_name: String,
    /// Defaults to the configured portal when omitted.
    #[serde(default)]
    pub portal_id: Option<String>,
}

/// `POST /api/sessions` - create a job/session pair and allocate a browser.
pub async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let portal_id = request.portal_id.unwrap_or_else(|| state.portal_id.clone());
    let session = state.service.start(&request.job_name, &portal_id).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /api/sessions/:session_id`
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state.service.get(&session_id)?;
    Ok(Json(session))
}

/// `POST /api/sessions/:session_id/confirm-ready` - the operator attests
/// login is complete and results are visible.
pub async fn confirm_ready(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state.service.confirm_ready(&session_id)?;
    Ok(Json(session))
}

/// `POST /api/sessions/:session_id/scrape` - explicitly claim a `ready`
/// session for scraping. A lost or premature claim is a conflict; the
/// session record is left untouched.
pub async fn scrape_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.service.claim_for_scraping(&session_id)? {
        let session = state.service.get(&session_id)?;
        return Err(ScrapeError::InvalidTransition {
            from: session.status,
            to: SessionStatus::Scraping,
        }
        .into());
    }
    let session = state.service.get(&session_id)?;
    Ok(Json(session))
}

/// `POST /api/sessions/:session_id/stop`
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.service.request_stop(&session_id)?;
    let session = state.service.get(&session_id)?;
    Ok(Json(session))
}

/// `GET /api/jobs/:job_id`
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = state
        .jobs
        .get(&job_id)
        .map_err(ScrapeError::from)?
        .ok_or_else(|| ScrapeError::NotFound(format!("job {job_id}")))?;
    Ok(Json(job))
}

/// `GET /api/jobs/:job_id/records` - all persisted records in scrape order.
pub async fn job_records(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let records = state
        .records
        .list_by_job(&job_id)
        .map_err(ScrapeError::from)?;
    Ok(Json(records))
}

/// `GET /api/jobs/:job_id/export` - the job's records as a CSV download.
pub async fn export_job_csv(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let records = state
        .records
        .list_by_job(&job_id)
        .map_err(ScrapeError::from)?;
    let csv = export::to_csv_string(&records)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{job_id}.csv\""),
            ),
        ],
        csv,
    ))
}
