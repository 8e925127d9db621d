use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "webhook_requests_total",
            "Inbound webhook requests by endpoint and outcome."
        );
        describe_counter!(
            "notifications_enqueued_total",
            "Notification requests handed to the dispatch scheduler."
        );
        describe_counter!(
            "notifications_released_total",
            "Notification requests released to fan-out."
        );
        describe_counter!(
            "deliveries_total",
            "Per-channel delivery attempts by outcome."
        );
        describe_counter!(
            "rss_new_entries_total",
            "Previously unseen feed entries that produced a notification."
        );
        describe_counter!("rss_fetch_errors_total", "Feed fetch or parse failures.");
        describe_gauge!("dispatch_pending", "Requests waiting for their dispatch time.");
        describe_gauge!(
            "rss_poll_last_run_ts",
            "Unix ts when the RSS poller last completed a cycle."
        );
        describe_histogram!("rss_fetch_ms", "Feed fetch and parse time in milliseconds.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Only one recorder per process.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
