use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{JobStatusResponse, SubmitResponse};
use crate::models::job::JobState;
use crate::services::lifecycle::{LifecycleError, SubmitError};
use crate::services::storage::StorageError;

/// POST /api/v1/slips — upload a slip image for reading.
pub async fn submit_slip(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, StatusCode> {
    let mut image_data: Option<Vec<u8>> = None;
    let mut user_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        match field.name() {
            Some("image") => {
                let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;

                // Validate image format using the `image` crate
                image::guess_format(&data).map_err(|_| StatusCode::UNSUPPORTED_MEDIA_TYPE)?;

                image_data = Some(data.to_vec());
            }
            Some("user_id") => {
                user_id = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            _ => {}
        }
    }

    let image_data = image_data.ok_or(StatusCode::BAD_REQUEST)?;
    let user_id = user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or(StatusCode::BAD_REQUEST)?;

    let job_id = state
        .manager
        .submit(&user_id, &image_data)
        .await
        .map_err(|e| match e {
            SubmitError::Busy => StatusCode::TOO_MANY_REQUESTS,
            SubmitError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            SubmitError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        })?;

    Ok(Json(SubmitResponse {
        job_id,
        status: JobState::Queued.to_string(),
        message: "Slip submitted for reading".to_string(),
    }))
}

/// GET /api/v1/slips/{job_id} — check job status and fetch results.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, StatusCode> {
    let snapshot = state.manager.poll(job_id).map_err(|e| match e {
        LifecycleError::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    })?;

    let mut result = None;
    let mut slip = None;
    if snapshot.state == JobState::Succeeded {
        result = match state.store.get_result(job_id).await {
            Ok(r) => serde_json::to_value(&r).ok(),
            Err(StorageError::NotFound) => None,
            Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
        };
        slip = match state.store.get_slip(job_id).await {
            Ok(s) => serde_json::to_value(&s).ok(),
            Err(StorageError::NotFound) => None,
            Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
        };
    }

    Ok(Json(JobStatusResponse {
        job_id,
        status: snapshot.state.to_string(),
        result,
        slip,
        error: snapshot.error,
    }))
}

/// DELETE /api/v1/slips/{job_id} — cancel a job still waiting for dispatch.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, StatusCode> {
    match state.manager.cancel(job_id).await {
        Ok(snapshot) => Ok(Json(JobStatusResponse {
            job_id,
            status: snapshot.state.to_string(),
            result: None,
            slip: None,
            error: snapshot.error,
        })),
        Err(LifecycleError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(LifecycleError::InvalidTransition { .. }) => Err(StatusCode::CONFLICT),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
