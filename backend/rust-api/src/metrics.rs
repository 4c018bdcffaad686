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

    // Business Metrics
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "form_submissions_total",
        "Form submission lifecycle events",
        &["event"]
    )
    .unwrap();

    pub static ref STEP_SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "form_step_submissions_total",
        "Step POSTs processed, by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref ANSWERS_RECORDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "form_answers_recorded_total",
        "Answers recorded, by question kind",
        &["kind"]
    )
    .unwrap();

    pub static ref UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "form_uploads_total",
        "Upload attempts, by result",
        &["result"]
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

pub fn record_submission_event(event: &str) {
    SUBMISSIONS_TOTAL.with_label_values(&[event]).inc();
}

pub fn record_step_outcome(outcome: &str) {
    STEP_SUBMISSIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_answer(kind: &str) {
    ANSWERS_RECORDED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_upload(result: &str) {
    UPLOADS_TOTAL.with_label_values(&[result]).inc();
}
