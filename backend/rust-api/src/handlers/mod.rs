use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::sync::Arc;

use crate::error::GradingError;
use crate::metrics;
use crate::middlewares::auth::JwtClaims;
use crate::models::Exam;
use crate::services::AppState;
use error::ApiError;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Check storage
    let storage = match tokio::time::timeout(std::time::Duration::from_secs(1), state.store.ping())
        .await
    {
        Ok(Ok(())) => json!({ "status": "healthy" }),
        Ok(Err(e)) => json!({ "status": "unhealthy", "error": e.to_string() }),
        Err(_) => json!({ "status": "unhealthy", "error": "storage timeout after 1s" }),
    };

    let healthy = storage.get("status").and_then(|v| v.as_str()) == Some("healthy");
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "service": "exam-grading-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": { "storage": storage }
        })),
    )
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// HTTP Basic Auth for `/metrics`, credentials from `metrics.auth` (`user:password`).
pub async fn metrics_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Only Basic auth is accepted here
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    // Format: user:password
    if credentials != state.config.metrics_auth {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

/// Loads the exam and checks that it belongs to the caller's tenant.
pub(crate) async fn load_exam_for(
    state: &AppState,
    claims: &JwtClaims,
    exam_id: &str,
) -> Result<Exam, ApiError> {
    let exam = state
        .store
        .find_exam(exam_id)
        .await?
        .ok_or_else(|| GradingError::not_found("exam", exam_id))?;

    if exam.tenant_id != claims.tenant_id {
        tracing::warn!(
            exam_id = exam_id,
            user_id = %claims.sub,
            tenant_id = %claims.tenant_id,
            "Cross-tenant exam access denied"
        );
        return Err(ApiError::Forbidden(
            "Exam belongs to another school".to_string(),
        ));
    }

    Ok(exam)
}

pub mod answer_keys;
pub mod attempts;
pub mod error;
pub mod results;
pub mod scans;
pub mod scores;
