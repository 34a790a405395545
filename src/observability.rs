use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total booking attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "medbook_bookings_total";

/// Counter: bookings rejected by a business rule. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "medbook_bookings_rejected_total";

/// Counter: availability windows published.
pub const WINDOWS_PUBLISHED_TOTAL: &str = "medbook_windows_published_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: doctor schedules loaded in memory.
pub const SCHEDULES_ACTIVE: &str = "medbook_schedules_active";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "medbook_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "medbook_journal_flush_batch_size";

/// Counter: journal append retries after a transient failure.
pub const JOURNAL_RETRIES_TOTAL: &str = "medbook_journal_retries_total";

/// Install the Prometheus metrics exporter on the given port. No-op if
/// port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install the fmt tracing subscriber. Call once from the embedding
/// process; repeated calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Short label for a rejected booking, used as the metrics `reason` label.
pub fn rejection_label(err: &crate::engine::EngineError) -> &'static str {
    use crate::engine::EngineError::*;
    match err {
        NotFound(_) => "not_found",
        PastDate(_) => "past_date",
        InvalidOrder => "invalid_order",
        Duration(_) => "duration",
        Unavailable(_) => "unavailable",
        Conflict(_) => "conflict",
        Overlap(_) => "overlap",
        InvalidTransition { .. } => "invalid_transition",
        InvalidRange => "invalid_range",
        Validation(_) => "validation",
        LimitExceeded(_) => "limit",
        Internal(_) => "internal",
    }
}
