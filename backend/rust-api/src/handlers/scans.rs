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
    models::scan::{BatchScanRequest, ManualScanRequest, ScanSheetRequest},
    services::AppState,
};

pub async fn scan_sheet(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
    AppJson(req): AppJson<ScanSheetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        exam_id = %exam_id,
        participant_id = %req.participant_id,
        image = %req.image_path,
        "Scanning answer sheet"
    );

    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    let record = state
        .scans()
        .grade_sheet(
            &exam,
            &req.participant_id,
            &req.image_path,
            req.scanner.as_deref(),
        )
        .await?;

    Ok(Json(record))
}

/// Sheets are matched to participants through their QR code.
pub async fn scan_batch(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
    AppJson(req): AppJson<BatchScanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        exam_id = %exam_id,
        images = req.image_paths.len(),
        "Scanning answer sheet batch"
    );

    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    let report = state
        .scans()
        .grade_batch(&exam, &req.image_paths, req.scanner.as_deref())
        .await?;

    Ok(Json(report))
}

pub async fn ingest_manual_scan(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(exam_id): Path<String>,
    AppJson(req): AppJson<ManualScanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        exam_id = %exam_id,
        participant_id = %req.participant_id,
        "Storing externally scanned sheet"
    );

    let exam = load_exam_for(&state, &claims, &exam_id).await?;
    let record = state
        .scans()
        .ingest_result(&exam, &req.participant_id, req.scan_result)
        .await?;

    Ok(Json(record))
}
