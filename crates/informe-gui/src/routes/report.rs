use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    extract::{FromRequestParts, Path},
    http::{StatusCode, header, request::Parts},
    response::{
        Response,
        sse::{KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::AppError;
use crate::state::{
    AppState, ReportRequest, ReportState, ReportStatus, ServiceMetrics, SseStream,
};

#[derive(Debug, Deserialize)]
pub struct StartReportRequest {
    pub topic: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartReportResponse {
    pub session_id: String,
    pub state: ReportState,
    pub capacity: ServiceMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListReportsResponse {
    pub reports: Vec<ReportStatus>,
    pub capacity: ServiceMetrics,
}

pub fn report_router() -> Router<AppState> {
    Router::new()
        .route("/reports", post(start_report).get(list_reports))
        .route("/reports/:id", get(get_report))
        .route("/reports/:id/stream", get(stream_report))
        .route("/reports/:id/document", get(download_document))
}

#[instrument(skip_all, fields(session_id = %payload.session_id.as_deref().unwrap_or("new")))]
async fn start_report(
    GuardedState(state): GuardedState,
    Json(payload): Json<StartReportRequest>,
) -> Result<(StatusCode, Json<StartReportResponse>), AppError> {
    if payload.topic.trim().is_empty() {
        return Err(AppError::bad_request("topic must not be empty"));
    }

    let service = state.report_service()?;
    let request = ReportRequest::new(payload.topic).with_session_id(payload.session_id);
    let session_id = service.start_report(request);

    let response = StartReportResponse {
        session_id,
        state: ReportState::Running,
        capacity: service.metrics(),
        message: Some("report started".into()),
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn get_report(
    GuardedState(state): GuardedState,
    Path(session_id): Path<String>,
) -> Result<Json<ReportStatus>, AppError> {
    match state.report_service()?.status(&session_id) {
        Some(status) => Ok(Json(status)),
        None => Err(AppError::not_found("report not found")),
    }
}

async fn list_reports(
    GuardedState(state): GuardedState,
) -> Result<Json<ListReportsResponse>, AppError> {
    let service = state.report_service()?;
    Ok(Json(ListReportsResponse {
        reports: service.list_reports(),
        capacity: service.metrics(),
    }))
}

async fn stream_report(
    GuardedState(state): GuardedState,
    Path(session_id): Path<String>,
) -> Result<Sse<SseStream>, AppError> {
    match state.report_service()?.event_stream(&session_id) {
        Some(stream) => Ok(Sse::new(stream).keep_alive(KeepAlive::new())),
        None => Err(AppError::not_found("report not found")),
    }
}

/// PDF download for a completed report.
///
/// The filename interpolates the raw topic after the literal `informe_`
/// prefix; no download exists for running, failed or timed-out reports.
async fn download_document(
    GuardedState(state): GuardedState,
    Path(session_id): Path<String>,
) -> Result<Response, AppError> {
    let service = state.report_service()?;

    if let Some((filename, bytes)) = service.document(&session_id) {
        let disposition = format!("attachment; filename=\"{filename}\"");
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/pdf")
            .header(header::CONTENT_DISPOSITION, disposition)
            .body(Body::from(bytes))
            .map_err(AppError::internal);
    }

    match service.status(&session_id) {
        Some(status) if status.state == ReportState::Running => {
            Err(AppError::conflict("report is still running"))
        }
        Some(_) => Err(AppError::not_found("no document for this report")),
        None => Err(AppError::not_found("report not found")),
    }
}

pub struct GuardedState(pub AppState);

#[async_trait]
impl FromRequestParts<AppState> for GuardedState {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let app_state = state.clone();

        if let Some(expected) = app_state.auth_token() {
            let provided = parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim);

            match provided {
                Some(token) if token == expected.as_str() => {}
                _ => {
                    return Err(AppError::new(
                        StatusCode::UNAUTHORIZED,
                        "invalid auth token",
                    ));
                }
            }
        }

        Ok(GuardedState(app_state))
    }
}
