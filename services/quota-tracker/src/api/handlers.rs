use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info};

use crate::tracker::{normalize_identity, TrackerError};

use super::types::{
    CheckUploadRequest, CheckUploadResponse, ErrorResponse, HealthResponse, RecordUploadRequest,
    RecordUploadResponse, UploadCountResponse, UploadHistoryResponse,
};
use super::ApiState;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn get_upload_count(
    State(state): State<Arc<ApiState>>,
    Path(identity): Path<String>,
) -> ApiResult<UploadCountResponse> {
    let tracker = &state.tracker;
    let count = tracker
        .get_upload_count(&identity)
        .await
        .map_err(tracker_error)?;
    let ceiling = tracker.ceiling();

    Ok(Json(UploadCountResponse {
        identity: normalize_identity(&identity),
        count,
        remaining: ceiling.saturating_sub(count),
        can_upload: count < ceiling,
        ceiling,
    }))
}

pub async fn get_upload_history(
    State(state): State<Arc<ApiState>>,
    Path(identity): Path<String>,
) -> ApiResult<UploadHistoryResponse> {
    let uploads = state
        .tracker
        .get_upload_history(&identity)
        .await
        .map_err(tracker_error)?;

    Ok(Json(UploadHistoryResponse {
        identity: normalize_identity(&identity),
        uploads,
    }))
}

pub async fn check_upload(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CheckUploadRequest>,
) -> ApiResult<CheckUploadResponse> {
    let ceiling = state.tracker.ceiling();

    match state.tracker.ensure_can_upload(&request.identity).await {
        Ok(remaining) => Ok(Json(CheckUploadResponse {
            allowed: true,
            remaining,
            ceiling,
        })),
        Err(TrackerError::CeilingReached { .. }) => Ok(Json(CheckUploadResponse {
            allowed: false,
            remaining: 0,
            ceiling,
        })),
        Err(err) => Err(tracker_error(err)),
    }
}

pub async fn record_upload(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<RecordUploadRequest>,
) -> Result<(StatusCode, Json<RecordUploadResponse>), ApiError> {
    if request.file_name.trim().is_empty() {
        return Err(bad_request("invalid_file_name", "file_name cannot be empty"));
    }

    let outcome = state
        .tracker
        .record_upload(&request.identity, &request.file_name, request.file_id)
        .await
        .map_err(tracker_error)?;

    let status = if outcome.success {
        info!(remaining = outcome.remaining, "upload recorded via API");
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };

    Ok((
        status,
        Json(RecordUploadResponse {
            success: outcome.success,
            remaining: outcome.remaining,
            message: outcome.message(),
            error: outcome.error,
        }),
    ))
}

pub async fn health_check(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    match state.tracker.health().await {
        Ok(backend) => Ok(Json(HealthResponse {
            status: "healthy".to_string(),
            service: "quota-tracker".to_string(),
            backend: Some(backend.to_string()),
        })),
        Err(err) => {
            error!(error = %err, "upload store health check failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    service: "quota-tracker".to_string(),
                    backend: Some(state.config.backend.to_string()),
                }),
            ))
        }
    }
}

fn tracker_error(err: TrackerError) -> ApiError {
    match err {
        TrackerError::InvalidIdentity(_) => bad_request("invalid_identity", "identity cannot be empty"),
        TrackerError::CeilingReached { ceiling, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: format!("You have reached the maximum of {ceiling} uploads for this email address"),
                code: "ceiling_reached".to_string(),
                details: Some(serde_json::json!({ "remaining": 0 })),
            }),
        ),
        TrackerError::StorageUnavailable(source) => {
            error!(error = %source, "upload store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "upload tracking is temporarily unavailable".to_string(),
                    code: "storage_unavailable".to_string(),
                    details: Some(serde_json::json!({ "message": source.to_string() })),
                }),
            )
        }
    }
}

fn bad_request(code: &str, message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}
