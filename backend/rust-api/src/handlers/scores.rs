use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use super::{error::ApiError, load_exam_for};
use crate::{
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::results::{RecalculateRequest, ScoreUpdateRequest},
    services::AppState,
};

/// Point-value edits followed by a re-derivation of every attempt. Records that
/// could not be refreshed are listed under `failedAttempts`.
pub async fn update_question_scores(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
    AppJson(req): AppJson<ScoreUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        exam_id = %exam_id,
        user_id = %claims.sub,
        updates = req.updates.len(),
        "Updating question scores"
    );

    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    // Partial failures still return 200 with the failed records listed
    let report = state
        .recalculation()
        .update_question_scores(&exam, &req.updates)
        .await?;

    Ok(Json(report))
}

pub async fn recalculate(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
    AppJson(req): AppJson<RecalculateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        exam_id = %exam_id,
        user_id = %claims.sub,
        targeted = req.attempt_ids.is_some(),
        "Recalculation requested"
    );

    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    let report = state
        .recalculation()
        .recalculate(&exam, req.attempt_ids)
        .await?;

    Ok(Json(report))
}
