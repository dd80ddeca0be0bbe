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
    models::answer_key::{AnswerKeySubmission, ScanKeyRequest},
    services::AppState,
};

/// Replaces the whole answer key of the exam. Questions missing from the
/// submission are removed; invalid entries are skipped and reported.
pub async fn replace_answer_key(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
    AppJson(req): AppJson<AnswerKeySubmission>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        exam_id = %exam_id,
        user_id = %claims.sub,
        entries = req.keys.len(),
        "Replacing answer key"
    );

    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    let report = state
        .answer_keys()
        .replace_answer_key(&exam, &req.keys)
        .await?;

    Ok(Json(report))
}

pub async fn scan_answer_key(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
    AppJson(req): AppJson<ScanKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        exam_id = %exam_id,
        user_id = %claims.sub,
        image = %req.image_path,
        apply = req.apply.is_some(),
        "Extracting answer key from sheet"
    );

    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    let extracted = state.answer_keys().extract_from_sheet(&exam, &req).await?;

    Ok(Json(extracted))
}
