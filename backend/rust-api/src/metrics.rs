use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Database Metrics (MongoDB)
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Grading Metrics
    pub static ref ANSWERS_SCORED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_scored_total",
        "Total number of answers scored, by verdict and source",
        &["verdict", "source"]
    )
    .unwrap();

    pub static ref ANSWER_KEY_ENTRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answer_key_entries_total",
        "Answer key entries processed",
        &["outcome"]
    )
    .unwrap();

    pub static ref CASCADE_RECORDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cascade_records_total",
        "Attempt records visited by score recalculation",
        &["outcome"]
    )
    .unwrap();

    pub static ref CASCADE_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "cascade_duration_seconds",
        "Score recalculation duration in seconds",
        &["trigger"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]
    )
    .unwrap();

    // Scanner Metrics
    pub static ref SCANS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "scans_total",
        "OMR scanner invocations",
        &["mode", "status"]
    )
    .unwrap();

    pub static ref SCAN_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "scan_duration_seconds",
        "OMR scanner process duration in seconds",
        &["script"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T, E>(operation: &str, collection: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

pub fn record_scored(verdict: &str, source: &str) {
    ANSWERS_SCORED_TOTAL
        .with_label_values(&[verdict, source])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .get();
        let _ = CASCADE_RECORDS_TOTAL.with_label_values(&["updated"]).get();
    }

    #[test]
    fn test_render_metrics() {
        record_scored("correct", "engine");

        let output = render_metrics().unwrap();
        assert!(output.contains("answers_scored_total"));
    }

    #[tokio::test]
    async fn tracked_operation_counts_errors() {
        let before = DB_OPERATIONS_TOTAL
            .with_label_values(&["find", "metrics_test", "error"])
            .get();

        let result: Result<(), &str> =
            track_db_operation("find", "metrics_test", async { Err("boom") }).await;

        assert!(result.is_err());
        let after = DB_OPERATIONS_TOTAL
            .with_label_values(&["find", "metrics_test", "error"])
            .get();
        assert_eq!(after, before + 1);
    }
}
