use axum::{
    http::{header, Method},
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::GradingError;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler).layer(middleware::from_fn_with_state(
                app_state.clone(),
                handlers::metrics_auth_middleware,
            )),
        )
        .nest(
            "/api/v1/exams",
            participant_routes()
                .merge(staff_routes())
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                )),
        )
        .with_state(app_state)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
}

/// Routes acting on the caller's own attempt.
fn participant_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{id}/attempts", post(handlers::attempts::start_attempt))
        .route(
            "/{id}/attempts/me/answers",
            put(handlers::attempts::submit_answer),
        )
        .route(
            "/{id}/attempts/me/finish",
            post(handlers::attempts::finish_attempt),
        )
        .route("/{id}/results/me", get(handlers::results::my_result))
}

fn staff_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Answer keys and point values
        .route(
            "/{id}/answer-keys",
            put(handlers::answer_keys::replace_answer_key),
        )
        .route(
            "/{id}/answer-keys/scan",
            post(handlers::answer_keys::scan_answer_key),
        )
        .route(
            "/{id}/question-scores",
            patch(handlers::scores::update_question_scores),
        )
        .route("/{id}/recalculate", post(handlers::scores::recalculate))
        // Grading
        .route(
            "/{id}/attempts/{participant}/grades",
            put(handlers::attempts::grade_answer),
        )
        .route("/{id}/scans", post(handlers::scans::scan_sheet))
        .route("/{id}/scans/batch", post(handlers::scans::scan_batch))
        .route(
            "/{id}/scans/manual",
            post(handlers::scans::ingest_manual_scan),
        )
        // Results
        .route(
            "/{id}/results/{participant}",
            get(handlers::results::participant_result),
        )
        .route("/{id}/ranking", get(handlers::results::exam_ranking))
        .route("/{id}/categories", get(handlers::results::exam_categories))
        .route_layer(middleware::from_fn(
            middlewares::auth::staff_guard_middleware,
        ))
}
