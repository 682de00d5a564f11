//! Business metrics for the reservation core.
//!
//! The engine records counters and a commit-latency histogram through the
//! `metrics` facade; wiring an exporter (Prometheus or otherwise) is the
//! embedding process's job.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `busline_reservations_total{status}` - reserve outcomes (confirmed, rejected)
//! - `busline_amendments_total{status}` - amend outcomes (applied, rejected)
//! - `busline_cancellations_total` - successful cancellations
//!
//! ## Histograms
//! - `busline_commit_duration_seconds` - durable ledger commit latency

use metrics::{describe_counter, describe_histogram};

// Re-export the recording macros so engine code pulls everything metric from
// this module.
pub use metrics::{counter, histogram};

/// Counter of reserve outcomes, labelled by `status`.
pub const RESERVATIONS_TOTAL: &str = "busline_reservations_total";

/// Counter of amend outcomes, labelled by `status`.
pub const AMENDMENTS_TOTAL: &str = "busline_amendments_total";

/// Counter of successful cancellations.
pub const CANCELLATIONS_TOTAL: &str = "busline_cancellations_total";

/// Histogram of ledger commit latency in seconds.
pub const COMMIT_DURATION_SECONDS: &str = "busline_commit_duration_seconds";

/// Register descriptions for every metric the engine emits.
///
/// Call once at process startup, before any metric is recorded. Safe to call
/// when no recorder is installed (the facade no-ops).
pub fn register_metrics() {
    describe_counter!(
        RESERVATIONS_TOTAL,
        "Total reserve operations by outcome status (confirmed, rejected)"
    );
    describe_counter!(
        AMENDMENTS_TOTAL,
        "Total amend operations by outcome status (applied, rejected)"
    );
    describe_counter!(
        CANCELLATIONS_TOTAL,
        "Total bookings cancelled with capacity credited back"
    );
    describe_histogram!(
        COMMIT_DURATION_SECONDS,
        "Time spent in the durable ledger commit, in seconds"
    );

    tracing::debug!("busline metrics registered");
}
