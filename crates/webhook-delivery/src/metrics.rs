/*!
 * Prometheus Metrics for Webhook Delivery
 *
 * Exposes metrics on /metrics endpoint for Prometheus scraping
 */

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, TextEncoder, opts, register_histogram_vec,
    register_int_counter_vec, register_int_gauge,
};

lazy_static! {
    /// Delivery attempts counter, labeled by outcome (success/retryable/permanent)
    pub static ref DELIVERY_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("webhook_delivery_attempts_total", "Total number of delivery attempts"),
        &["outcome"]
    )
    .expect("metric can be created");

    /// Delivery attempt duration histogram
    pub static ref DELIVERY_DURATION: HistogramVec = register_histogram_vec!(
        "webhook_delivery_duration_seconds",
        "Webhook delivery attempt duration in seconds",
        &["outcome"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("metric can be created");

    /// HTTP status codes received from subscriber endpoints
    pub static ref HTTP_RESPONSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("webhook_delivery_http_responses_total", "Total HTTP responses by status code"),
        &["status_code"]
    )
    .expect("metric can be created");

    /// Number of deliveries claimed per poll cycle
    pub static ref CLAIMED_BATCH_SIZE: IntGauge = register_int_gauge!(
        "webhook_delivery_claimed_batch_size",
        "Number of deliveries claimed in the most recent poll cycle"
    )
    .expect("metric can be created");

    /// Deliveries that exhausted retries and were dead-lettered
    pub static ref DEAD_LETTERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("webhook_delivery_dead_letters_total", "Total number of deliveries dead-lettered"),
        &["reason"]
    )
    .expect("metric can be created");

    /// Deliveries sent back for retry
    pub static ref RETRY_SCHEDULED_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("webhook_delivery_retry_scheduled_total", "Total number of deliveries rescheduled for retry"),
        &["outcome"]
    )
    .expect("metric can be created");

    /// Current number of worker permits in use
    pub static ref WORKERS_IN_USE: IntGauge = register_int_gauge!(
        "webhook_delivery_workers_in_use",
        "Current number of worker slots occupied by an in-flight attempt"
    )
    .expect("metric can be created");

    /// Deliveries reopened by the crash-recovery sweep at startup
    pub static ref REOPENED_ON_STARTUP: IntGauge = register_int_gauge!(
        "webhook_delivery_reopened_on_startup",
        "Number of in_flight deliveries reopened by the startup recovery sweep"
    )
    .expect("metric can be created");
}

/// Render metrics in Prometheus text exposition format.
pub fn render_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
