use std::net::SocketAddr;

use crate::engine::EngineError;

// ── Request metrics ─────────────────────────────────────────────

/// Counter: booking requests. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "spotbook_bookings_total";

/// Histogram: booking latency in seconds, persistence included.
pub const BOOK_DURATION_SECONDS: &str = "spotbook_book_duration_seconds";

/// Counter: unbooking requests. Labels: outcome.
pub const UNBOOKINGS_TOTAL: &str = "spotbook_unbookings_total";

/// Counter: conflicting reservations removed or clipped by overbooking. Labels: kind.
pub const RESERVATIONS_CLIPPED_TOTAL: &str = "spotbook_reservations_clipped_total";

/// Counter: merges applied after a booking.
pub const MERGES_TOTAL: &str = "spotbook_merges_total";

/// Counter: clip notices that could not be delivered.
pub const NOTIFICATIONS_FAILED_TOTAL: &str = "spotbook_notifications_failed_total";

// ── Store metrics ───────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "spotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "spotbook_wal_flush_batch_size";

/// Counter: ended reservations pruned by the reaper.
pub const RESERVATIONS_PRUNED_TOTAL: &str = "spotbook_reservations_pruned_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short outcome label for a request result.
pub fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => error_label(e),
    }
}

pub fn error_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::SpotNotFound(_) => "spot_not_found",
        EngineError::TimestampOutOfRange(_) => "timestamp_out_of_range",
        EngineError::EmptyWindow => "empty_window",
        EngineError::DurationExceeded { .. } => "duration_exceeded",
        EngineError::RollingDurationExceeded { .. } => "rolling_duration_exceeded",
        EngineError::SelfOverbook => "self_overbook",
        EngineError::GracePeriodNotElapsed { .. } => "grace_period",
        EngineError::InsufficientPermissions { .. } => "insufficient_permissions",
        EngineError::NotFound(_) => "not_found",
        EngineError::DeleteFailed { .. } => "delete_failed",
        EngineError::Repository { .. } => "repository",
    }
}
