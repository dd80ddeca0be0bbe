use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use super::{error::ApiError, load_exam_for};
use crate::{
    middlewares::auth::JwtClaims,
    services::{statistics_service::Viewer, AppState},
};

/// The caller's own result. Scores are withheld when the exam hides them.
pub async fn my_result(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    let viewer = if claims.is_staff() {
        Viewer::Staff
    } else {
        Viewer::Participant
    };

    let result = state
        .statistics()
        .participant_result(&exam, &claims.sub, viewer)
        .await?;

    Ok(Json(result))
}

pub async fn participant_result(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((exam_id, participant_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    let result = state
        .statistics()
        .participant_result(&exam, &participant_id, Viewer::Staff)
        .await?;

    Ok(Json(result))
}

pub async fn exam_ranking(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    Ok(Json(state.statistics().exam_ranking(&exam).await?))
}

pub async fn exam_categories(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    Ok(Json(state.statistics().exam_categories(&exam).await?))
}
