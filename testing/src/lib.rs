//! # Busline Testing
//!
//! Testing utilities for the Busline reservation core:
//!
//! - Mock implementations of the engine's injected collaborators
//!   (`MemoryLedger`, `FlakyLedger`, `FixedClock`)
//! - Fixtures for the sample fleet and passengers
//! - A tracing helper for readable test output
//!
//! ## Example
//!
//! ```
//! use busline_testing::{fixtures, mocks::MemoryLedger};
//! use busline_core::{EngineConfig, ReservationEngine, SystemClock};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), busline_core::ReservationError> {
//! let ledger = Arc::new(MemoryLedger::with_buses(fixtures::fleet()));
//! let engine =
//!     ReservationEngine::open(ledger, Arc::new(SystemClock), EngineConfig::default()).await?;
//! let buses = engine.queries().list_buses(None);
//! assert_eq!(buses.len(), 8);
//! # Ok(())
//! # }
//! ```

/// Mock implementations of the engine's injected collaborators.
pub mod mocks {
    use busline_core::environment::Clock;
    use busline_core::ledger::{Changeset, LedgerError, LedgerStore};
    use busline_core::types::{Booking, BookingId, Bus, BusId};
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making timestamps reproducible.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-03-01 00:00:00 UTC).
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which should never
    /// happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-03-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    #[derive(Debug, Default)]
    struct Tables {
        buses: HashMap<BusId, Bus>,
        bookings: HashMap<BookingId, Booking>,
    }

    /// In-memory ledger store: fast, deterministic, and inspectable.
    ///
    /// Commits apply the changeset to plain in-memory tables; `load_all`
    /// snapshots them. Atomicity is trivial because everything happens under
    /// one mutex.
    #[derive(Debug, Default)]
    pub struct MemoryLedger {
        tables: Mutex<Tables>,
    }

    impl MemoryLedger {
        /// Create an empty ledger.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a ledger seeded with `buses` and no bookings.
        #[must_use]
        pub fn with_buses(buses: Vec<Bus>) -> Self {
            Self::with_state(buses, Vec::new())
        }

        /// Create a ledger seeded with `buses` and `bookings`.
        #[must_use]
        pub fn with_state(buses: Vec<Bus>, bookings: Vec<Booking>) -> Self {
            Self {
                tables: Mutex::new(Tables {
                    buses: buses.into_iter().map(|b| (b.id, b)).collect(),
                    bookings: bookings.into_iter().map(|b| (b.id, b)).collect(),
                }),
            }
        }

        /// Number of commits recorded so far (confirmed plus cancelled).
        #[must_use]
        pub fn booking_count(&self) -> usize {
            self.lock().bookings.len()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
            self.tables.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn apply(&self, changeset: Changeset) -> Result<(), LedgerError> {
            let mut tables = self.lock();
            for update in &changeset.seat_updates {
                let bus = tables.buses.get_mut(&update.bus_id).ok_or_else(|| {
                    LedgerError::Corrupt(format!(
                        "changeset references unknown bus {}",
                        update.bus_id
                    ))
                })?;
                bus.schedule.insert(update.date, update.remaining);
            }
            tables
                .bookings
                .insert(changeset.booking.id, changeset.booking);
            Ok(())
        }
    }

    impl LedgerStore for MemoryLedger {
        fn load_all(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<(Vec<Bus>, Vec<Booking>), LedgerError>> + Send + '_>>
        {
            Box::pin(async move {
                let tables = self.lock();
                let mut buses: Vec<Bus> = tables.buses.values().cloned().collect();
                buses.sort_by_key(|b| b.id);
                let mut bookings: Vec<Booking> = tables.bookings.values().cloned().collect();
                bookings.sort_by_key(|b| b.created_at);
                Ok((buses, bookings))
            })
        }

        fn commit(
            &self,
            changeset: Changeset,
        ) -> Pin<Box<dyn Future<Output = Result<(), LedgerError>> + Send + '_>> {
            Box::pin(async move { self.apply(changeset) })
        }
    }

    /// Ledger that fails a programmable number of commits before recovering.
    ///
    /// Used to verify that a storage failure rolls the inventory index back
    /// and leaves no half-applied state behind.
    #[derive(Debug, Default)]
    pub struct FlakyLedger {
        inner: MemoryLedger,
        failures_remaining: AtomicU32,
    }

    impl FlakyLedger {
        /// Create a flaky ledger seeded with `buses`.
        #[must_use]
        pub fn with_buses(buses: Vec<Bus>) -> Self {
            Self {
                inner: MemoryLedger::with_buses(buses),
                failures_remaining: AtomicU32::new(0),
            }
        }

        /// Make the next `count` commits fail with an I/O error.
        pub fn fail_commits(&self, count: u32) {
            self.failures_remaining.store(count, Ordering::SeqCst);
        }

        /// Number of commits recorded by the healthy inner ledger.
        #[must_use]
        pub fn booking_count(&self) -> usize {
            self.inner.booking_count()
        }
    }

    impl LedgerStore for FlakyLedger {
        fn load_all(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<(Vec<Bus>, Vec<Booking>), LedgerError>> + Send + '_>>
        {
            self.inner.load_all()
        }

        fn commit(
            &self,
            changeset: Changeset,
        ) -> Pin<Box<dyn Future<Output = Result<(), LedgerError>> + Send + '_>> {
            let should_fail = self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
                .is_ok();
            if should_fail {
                return Box::pin(async {
                    Err(LedgerError::Io("injected commit failure".to_string()))
                });
            }
            self.inner.commit(changeset)
        }
    }
}

/// Canned domain data for tests.
pub mod fixtures {
    use busline_core::seed;
    use busline_core::types::{Bus, Passenger};
    use chrono::NaiveDate;

    /// First departure date of the fixture fleet.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded date fails to construct, which should never
    /// happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn first_departure() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 15).expect("hardcoded date should always be valid")
    }

    /// The eight-route sample fleet, departing from [`first_departure`].
    #[must_use]
    pub fn fleet() -> Vec<Bus> {
        seed::sample_fleet(first_departure())
    }

    /// A passenger with plausible contact details.
    #[must_use]
    pub fn passenger() -> Passenger {
        Passenger::new("Asha Rao", "asha.rao@example.com", "+91-98765-43210")
    }
}

/// Test-run helpers.
pub mod helpers {
    /// Install a fmt subscriber honouring `RUST_LOG`; safe to call from every
    /// test (later calls are no-ops).
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, FlakyLedger, MemoryLedger, test_clock};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use busline_core::ledger::{Changeset, LedgerStore, SeatUpdate};
    use busline_core::types::{Booking, BookingId, BookingStatus, BusId};
    use chrono::Utc;

    #[tokio::test]
    async fn memory_ledger_round_trips_a_changeset() {
        let ledger = MemoryLedger::with_buses(fixtures::fleet());
        let date = fixtures::first_departure();
        let now = Utc::now();
        let booking = Booking {
            id: BookingId::new(),
            bus_id: BusId::new(1),
            date,
            seats: 3,
            passenger: fixtures::passenger(),
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        };

        ledger
            .commit(Changeset::new(
                booking.clone(),
                vec![SeatUpdate {
                    bus_id: BusId::new(1),
                    date,
                    remaining: 42,
                }],
            ))
            .await
            .unwrap();

        let (buses, bookings) = ledger.load_all().await.unwrap();
        assert_eq!(bookings, vec![booking]);
        let bus = buses.iter().find(|b| b.id == BusId::new(1)).unwrap();
        assert_eq!(bus.schedule.get(&date), Some(&42));
    }

    #[tokio::test]
    async fn flaky_ledger_fails_then_recovers() {
        let ledger = FlakyLedger::with_buses(fixtures::fleet());
        ledger.fail_commits(1);
        let date = fixtures::first_departure();
        let now = Utc::now();
        let booking = Booking {
            id: BookingId::new(),
            bus_id: BusId::new(1),
            date,
            seats: 1,
            passenger: fixtures::passenger(),
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        };
        let changeset = Changeset::new(booking, Vec::new());

        assert!(ledger.commit(changeset.clone()).await.is_err());
        assert!(ledger.commit(changeset).await.is_ok());
        assert_eq!(ledger.booking_count(), 1);
    }

    #[test]
    fn fixed_clock_is_deterministic() {
        use busline_core::environment::Clock;
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }
}
