//! Concurrency stress tests for last-seat scenarios.
//!
//! These tests verify that under heavy concurrent load the engine correctly
//! serialises per-bus mutations and never oversells, while different buses
//! proceed in parallel.
//!
//! Run with: `cargo test --test concurrency_stress -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use busline_core::ledger::{Changeset, LedgerError, LedgerStore};
use busline_core::types::{Booking, Bus, BusId};
use busline_core::{EngineConfig, Passenger, ReservationEngine, ReservationError, SystemClock};
use busline_testing::mocks::MemoryLedger;
use busline_testing::{fixtures, helpers};
use chrono::NaiveDate;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

fn departure() -> NaiveDate {
    fixtures::first_departure()
}

async fn engine_with_fleet() -> Arc<ReservationEngine> {
    helpers::init_tracing();
    let ledger = Arc::new(MemoryLedger::with_buses(fixtures::fleet()));
    Arc::new(
        ReservationEngine::open(ledger, Arc::new(SystemClock), EngineConfig::default())
            .await
            .expect("engine should open"),
    )
}

/// 100 concurrent reservation attempts for a cell with far fewer seats.
///
/// Exactly the subset whose seat counts sum to the capacity can succeed; the
/// rest must fail with `InsufficientSeats`, and remaining never goes
/// negative. With 100 single-seat requests against 35 seats, that means
/// exactly 35 successes.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn hundred_concurrent_requests_never_oversell() {
    let engine = engine_with_fleet().await;
    let hyderabad_bangalore = BusId::new(4); // 35 seats

    let handles: Vec<_> = (0..100)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let result = engine
                    .reserve(
                        hyderabad_bangalore,
                        departure(),
                        1,
                        Passenger::new(format!("Rider {i}"), format!("rider{i}@example.com"), "0"),
                    )
                    .await;
                result.is_ok()
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let successes = results
        .into_iter()
        .filter(|r| *r.as_ref().expect("task should not panic"))
        .count();

    println!("  successes: {successes}/100 for 35 seats");
    assert_eq!(successes, 35);

    let remaining = engine
        .queries()
        .seats_remaining(hyderabad_bangalore, departure())
        .unwrap();
    assert_eq!(remaining, 0);
}

/// The five-seat scenario: reserve 3, then race a 2-seat and a 1-seat
/// request for the 2 remaining seats. Exactly one of them can win.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_seats_race_admits_exactly_one_winner() {
    helpers::init_tracing();
    let mut fleet = fixtures::fleet();
    for bus in &mut fleet {
        if bus.id == BusId::new(3) {
            bus.total_seats = 5;
            for remaining in bus.schedule.values_mut() {
                *remaining = 5;
            }
        }
    }
    let ledger = Arc::new(MemoryLedger::with_buses(fleet));
    let engine = Arc::new(
        ReservationEngine::open(ledger, Arc::new(SystemClock), EngineConfig::default())
            .await
            .unwrap(),
    );
    let bus = BusId::new(3);

    engine
        .reserve(bus, departure(), 3, fixtures::passenger())
        .await
        .unwrap();
    assert_eq!(engine.queries().seats_remaining(bus, departure()).unwrap(), 2);

    let two = {
        let engine = Arc::clone(&engine);
        tokio::spawn(
            async move { engine.reserve(bus, departure(), 2, fixtures::passenger()).await },
        )
    };
    let one = {
        let engine = Arc::clone(&engine);
        tokio::spawn(
            async move { engine.reserve(bus, departure(), 1, fixtures::passenger()).await },
        )
    };

    let (two, one) = (two.await.unwrap(), one.await.unwrap());
    let winners = usize::from(two.is_ok()) + usize::from(one.is_ok());
    assert_eq!(winners, 1, "exactly one racer can be seated");

    let loser = if two.is_ok() { one } else { two };
    assert!(matches!(
        loser,
        Err(ReservationError::InsufficientSeats { .. })
    ));

    let remaining = engine.queries().seats_remaining(bus, departure()).unwrap();
    assert!(remaining == 0 || remaining == 1, "depends on arrival order");
}

/// Mixed seat sizes: winners' seats plus remaining must always equal the
/// nominal capacity, and losers must all be `InsufficientSeats`.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn mixed_size_requests_balance_to_capacity() {
    let engine = engine_with_fleet().await;
    let chennai_coimbatore = BusId::new(6); // 36 seats

    let handles: Vec<_> = (0_u32..40)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let seats = (i % 3) + 1;
            tokio::spawn(async move {
                engine
                    .reserve(
                        chennai_coimbatore,
                        departure(),
                        seats,
                        fixtures::passenger(),
                    )
                    .await
            })
        })
        .collect();

    let mut seated = 0;
    for handle in futures::future::join_all(handles).await {
        match handle.expect("task should not panic") {
            Ok(booking) => seated += booking.seats,
            Err(ReservationError::InsufficientSeats { .. }) => {}
            Err(other) => panic!("unexpected failure kind: {other}"),
        }
    }

    let remaining = engine
        .queries()
        .seats_remaining(chennai_coimbatore, departure())
        .unwrap();
    println!("  seated: {seated}, remaining: {remaining}");
    assert_eq!(seated + remaining, 36);
}

/// Operations on different buses do not serialise against each other; a
/// full fleet of concurrent single-seat requests all succeed.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn different_buses_proceed_in_parallel() {
    let engine = engine_with_fleet().await;

    let handles: Vec<_> = (1..=8)
        .map(|id| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .reserve(BusId::new(id), departure(), 1, fixtures::passenger())
                    .await
            })
        })
        .collect();

    for handle in futures::future::join_all(handles).await {
        assert!(handle.expect("task should not panic").is_ok());
    }
}

/// Two racing cancels of the same booking: one wins, one observes
/// `AlreadyCancelled`, capacity is credited exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_cancels_credit_capacity_once() {
    let engine = engine_with_fleet().await;
    let bus = BusId::new(2); // 38 seats

    let booking = engine
        .reserve(bus, departure(), 4, fixtures::passenger())
        .await
        .unwrap();

    let a = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.cancel(booking.id).await })
    };
    let b = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.cancel(booking.id).await })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
    assert!(matches!(
        if a.is_ok() { b } else { a },
        Err(ReservationError::AlreadyCancelled(_))
    ));

    let remaining = engine.queries().seats_remaining(bus, departure()).unwrap();
    assert_eq!(remaining, 38);
}

/// Ledger whose commits stall long enough to exercise the lock-wait bound.
struct SlowLedger {
    inner: MemoryLedger,
    delay: Duration,
}

impl LedgerStore for SlowLedger {
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
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.inner.commit(changeset).await
        })
    }
}

/// A caller that cannot acquire the per-bus section within the configured
/// wait is abandoned with `Timeout` and no side effect; waiters on other
/// buses are unaffected.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lock_wait_is_bounded() {
    helpers::init_tracing();
    let ledger = Arc::new(SlowLedger {
        inner: MemoryLedger::with_buses(fixtures::fleet()),
        delay: Duration::from_millis(300),
    });
    let config = EngineConfig {
        lock_timeout: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let engine = Arc::new(
        ReservationEngine::open(ledger, Arc::new(SystemClock), config)
            .await
            .unwrap(),
    );
    let bus = BusId::new(1);

    let holder = {
        let engine = Arc::clone(&engine);
        tokio::spawn(
            async move { engine.reserve(bus, departure(), 1, fixtures::passenger()).await },
        )
    };
    // Let the holder enter its critical section and stall in the commit.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = engine
        .reserve(bus, departure(), 1, fixtures::passenger())
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::Timeout(id) if id == bus));
    assert!(err.is_retryable());

    // A different bus is untouched by the stalled holder.
    engine
        .reserve(BusId::new(5), departure(), 1, fixtures::passenger())
        .await
        .unwrap();

    holder.await.unwrap().unwrap();
    // The holder committed; the timed-out caller left no trace.
    let remaining = engine.queries().seats_remaining(bus, departure()).unwrap();
    assert_eq!(remaining, 44);
}
