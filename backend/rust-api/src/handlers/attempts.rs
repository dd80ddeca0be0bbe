use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use super::{error::ApiError, load_exam_for};
use crate::{
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::attempt::{GradeAnswerRequest, SubmitAnswerRequest},
    services::AppState,
};

pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    let record = state.attempts().start_attempt(&exam, &claims.sub).await?;

    Ok((StatusCode::OK, Json(record)))
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::debug!(
        exam_id = %exam_id,
        participant_id = %claims.sub,
        question_id = %req.question_id,
        "Submitting answer"
    );

    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    let record = state
        .attempts()
        .submit_answer(&exam, &claims.sub, &req.question_id, req.value)
        .await?;

    Ok(Json(record))
}

pub async fn finish_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    let record = state.attempts().finish_attempt(&exam, &claims.sub).await?;

    Ok(Json(record))
}

/// Grader score for an open (or any) answer of a finished attempt.
pub async fn grade_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((exam_id, participant_id)): Path<(String, String)>,
    AppJson(req): AppJson<GradeAnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        exam_id = %exam_id,
        participant_id = %participant_id,
        question_id = %req.question_id,
        grader = %claims.sub,
        score = req.score,
        "Grading answer"
    );

    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    let record = state
        .attempts()
        .grade_answer(&exam, &participant_id, &req.question_id, req.score)
        .await?;

    Ok(Json(record))
}
