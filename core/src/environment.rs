//! Injected runtime dependencies.
//!
//! The engine never reads the wall clock directly; it goes through the
//! [`Clock`] trait so tests can pin time. Mirrors the dependency-injection
//! seam used for every other collaborator (ledger store, configuration).

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Implementations must be `Send + Sync` so they can be shared behind an
/// `Arc<dyn Clock>` across concurrent request handlers.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
