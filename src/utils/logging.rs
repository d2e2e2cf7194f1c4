use std::env;
use tracing_subscriber::{
    fmt::{format::FmtSpan, time::ChronoUtc},
    EnvFilter,
};

use super::{GuardError, GuardResult};

/// Initialize the logging system with the level taken from `RUST_LOG`
pub fn init_logging() -> GuardResult<()> {
    // Get the log level from environment variable or default to INFO
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_level(true)
        .with_timer(ChronoUtc::rfc_3339())
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| GuardError::Internal(format!("Failed to set tracing subscriber: {}", e)))
}

/// Create a new span for tracking request context
pub fn create_request_span(request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        request_id = %request_id,
        timestamp = %chrono::Utc::now()
    )
}

/// Log a ban written by the ban list. `fresh` tells an insert from an extension.
pub fn log_ban_issued(ip: &str, until: &chrono::DateTime<chrono::Utc>, reason: &str, fresh: bool) {
    let event = if fresh { "ban_added" } else { "ban_extended" };
    tracing::info!(
        ip = %ip,
        until = %until,
        reason = %reason,
        fresh = %fresh,
        event = %event,
    );
}

/// Log an ip the crawler classifier recognised
pub fn log_autowhitelist_match(ip: &str, hostname: &str, description: &str) {
    tracing::info!(
        ip = %ip,
        hostname = %hostname,
        description = %description,
        event = "autowhitelist_match",
    );
}

/// Log an observation dropped at the ingestion boundary
pub fn log_rejected_observation(ip: &str, timestamp: &str, cause: &str) {
    tracing::warn!(
        ip = %ip,
        timestamp = %timestamp,
        cause = %cause,
        event = "observation_rejected",
    );
}

/// Log the outcome of a batch job run
pub fn log_job_event(job: &str, success: bool, details: Option<&str>) {
    if success {
        tracing::info!(job = %job, success = %success, details = ?details);
    } else {
        tracing::error!(job = %job, success = %success, details = ?details);
    }
}
