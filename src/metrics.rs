//! Metrics for observability.
//!
//! Records through the `metrics` facade; the embedding process installs
//! whatever exporter it wants. Covers:
//! - Message creation and fan-out duration
//! - Per-repository replication outcomes
//! - Remote call latency by operation
//! - Commit ledger writes
//! - Push and remote fetch results
//! - SQLite busy retries and circuit breaker calls
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `mirror_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use message_mirror::metrics;
//! use std::time::Duration;
//!
//! metrics::record_replication_outcome("alice/notes", true);
//! metrics::record_fanout(3, 2, Duration::from_millis(120));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a message accepted by the local store.
pub fn record_message_created() {
    counter!("mirror_messages_created_total").increment(1);
}

/// Record one (message, repository) replication attempt.
pub fn record_replication_outcome(repository: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "mirror_replications_total",
        "repository" => repository.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record a replication failure by error kind.
pub fn record_replication_error(repository: &str, kind: &str) {
    counter!(
        "mirror_replication_errors_total",
        "repository" => repository.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a completed fan-out across all targets.
pub fn record_fanout(targets: usize, succeeded: usize, duration: Duration) {
    counter!("mirror_fanouts_total").increment(1);
    histogram!("mirror_fanout_targets").record(targets as f64);
    histogram!("mirror_fanout_succeeded").record(succeeded as f64);
    histogram!("mirror_fanout_duration_seconds").record(duration.as_secs_f64());
}

/// Record a remote content service call latency by operation type.
pub fn record_remote_call(repository: &str, operation: &str, success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    histogram!(
        "mirror_remote_call_duration_seconds",
        "repository" => repository.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
    counter!(
        "mirror_remote_calls_total",
        "operation" => operation.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record ledger entries written.
pub fn record_ledger_writes(written: usize, skipped: usize) {
    counter!("mirror_ledger_writes_total").increment(written as u64);
    if skipped > 0 {
        counter!("mirror_ledger_skipped_total").increment(skipped as u64);
    }
}

/// Record SQLite retry (for SQLITE_BUSY/SQLITE_LOCKED).
pub fn store_retries_total(operation: &str) {
    counter!("mirror_store_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record the result of pushing one repository.
pub fn record_push(repository: &str, attempted: usize, mirrored: usize, duration: Duration) {
    counter!("mirror_push_attempted_total", "repository" => repository.to_string())
        .increment(attempted as u64);
    counter!("mirror_push_mirrored_total", "repository" => repository.to_string())
        .increment(mirrored as u64);
    histogram!("mirror_push_duration_seconds", "repository" => repository.to_string())
        .record(duration.as_secs_f64());
    gauge!("mirror_push_backlog", "repository" => repository.to_string())
        .set(attempted.saturating_sub(mirrored) as f64);
}

/// Record a remote fetch of one repository's message files.
pub fn record_remote_fetch(repository: &str, messages: usize, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "mirror_remote_fetches_total",
        "repository" => repository.to_string(),
        "status" => status
    )
    .increment(1);
    if success {
        counter!("mirror_remote_messages_read_total", "repository" => repository.to_string())
            .increment(messages as u64);
    }
}

/// Gauge for number of registered repository targets.
pub fn set_registered_targets(count: usize) {
    gauge!("mirror_registered_targets").set(count as f64);
}

// =============================================================================
// Circuit Breaker Metrics
// =============================================================================

/// Record circuit breaker call outcome.
pub fn record_circuit_call(repository: &str, outcome: &str) {
    counter!(
        "mirror_circuit_calls_total",
        "repository" => repository.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
