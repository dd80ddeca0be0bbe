mod common;

use axum::http::StatusCode;
use base64::{engine::general_purpose, Engine as _};

#[tokio::test]
async fn test_health_reports_storage() {
    let app = common::create_test_app().await;

    let (status, json) = app.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "exam-grading-api");
    assert_eq!(json["dependencies"]["storage"]["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_require_basic_auth() {
    let app = common::create_test_app().await;

    let (status, _) = app.send("GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = axum::http::Request::builder()
        .uri("/metrics")
        .header(
            "authorization",
            format!("Basic {}", general_purpose::STANDARD.encode("metrics:secret")),
        )
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_responses_carry_trace_id() {
    let app = common::create_test_app().await;

    let request = axum::http::Request::builder()
        .uri("/health")
        .header("x-trace-id", "trace-abc")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();

    assert_eq!(response.headers()["x-trace-id"], "trace-abc");
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let app = common::create_test_app().await;
    let exam = app.seed_exam(true).await;

    let (status, _) = app
        .send(
            "GET",
            &format!("/api/v1/exams/{}/results/me", exam.id),
            Some("not-a-jwt"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
