//! Engine configuration.
//!
//! Loaded from environment variables with sensible defaults, so the embedding
//! process (typically the HTTP layer) can tune the engine without code
//! changes.

use std::env;
use std::time::Duration;

/// Default bound on a single lock wait.
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Default per-booking seat cap.
const DEFAULT_MAX_SEATS: u32 = 8;

/// Tunables for the reservation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a caller may wait for a per-bus critical section before the
    /// operation is abandoned with a `Timeout` failure.
    pub lock_timeout: Duration,
    /// Upper bound on seats in a single booking. Requests outside
    /// `1..=max_seats_per_booking` fail validation before any state is read.
    pub max_seats_per_booking: u32,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Recognised variables, all optional:
    /// - `BUSLINE_LOCK_TIMEOUT_MS` (default 5000)
    /// - `BUSLINE_MAX_SEATS_PER_BOOKING` (default 8)
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            lock_timeout: Duration::from_millis(
                env::var("BUSLINE_LOCK_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_LOCK_TIMEOUT_MS),
            ),
            max_seats_per_booking: env::var("BUSLINE_MAX_SEATS_PER_BOOKING")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_SEATS),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            max_seats_per_booking: DEFAULT_MAX_SEATS,
        }
    }
}
