//! Prometheus metrics exposition
//!
//! Gateway metrics:
//!
//! - `gateway_uploads_total` (counter): label `outcome`
//! - `gateway_upload_bytes_total` (counter)
//! - `gateway_transfer_duration_seconds` (histogram): label `outcome`
//! - `gateway_streams_total` (counter): label `outcome`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `gateway_transfer_duration_seconds` gets explicit buckets so it renders
/// as a histogram with `_bucket` lines; large transfers can take minutes, so
/// the boundaries run from 50ms to 10 minutes.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "gateway_transfer_duration_seconds".to_string(),
            ),
            &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0],
        )
        .map_err(|e| anyhow::anyhow!("failed to set histogram buckets: {e}"))?
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;
    Ok(handle)
}

/// Record a finished upload with its outcome label.
pub fn record_upload(outcome: &str, bytes: u64, duration_secs: f64) {
    metrics::counter!("gateway_uploads_total", "outcome" => outcome.to_string()).increment(1);
    metrics::counter!("gateway_upload_bytes_total").increment(bytes);
    metrics::histogram!("gateway_transfer_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

/// Record a finished stream with its outcome label.
pub fn record_stream(outcome: &str) {
    metrics::counter!("gateway_streams_total", "outcome" => outcome.to_string()).increment(1);
}
