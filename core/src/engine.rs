//! The reservation engine: sole entry point for mutating bookings.
//!
//! Every mutation runs inside a per-bus critical section, so operations on
//! one bus serialise in lock-acquisition order while different buses proceed
//! fully in parallel. Inside the section the engine validates against the
//! [`InventoryIndex`], applies the capacity delta, and commits the matching
//! [`Changeset`] through the ledger before releasing. A failed durable commit
//! rolls the index delta back, so the in-memory view never runs ahead of the
//! log.
//!
//! Lock waits are bounded: a caller that cannot enter the critical section
//! within the configured timeout is abandoned with a `Timeout` failure
//! without touching any state.

use crate::config::EngineConfig;
use crate::environment::Clock;
use crate::error::ReservationError;
use crate::inventory::InventoryIndex;
use crate::ledger::{Changeset, LedgerStore, SeatUpdate};
use crate::metrics::{
    AMENDMENTS_TOTAL, CANCELLATIONS_TOTAL, COMMIT_DURATION_SECONDS, RESERVATIONS_TOTAL, counter,
    histogram,
};
use crate::query::QueryService;
use crate::types::{Booking, BookingId, BookingStatus, Bus, BusId, Passenger, Version};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::sync::{Mutex as BusLock, OwnedMutexGuard};
use tokio::time::timeout;

/// One lock per bus, covering all dates of that bus.
///
/// Coarser than per-(bus, date) so a date-changing amendment touches both of
/// its cells under a single section; finer than a global lock so unrelated
/// buses never contend.
#[derive(Debug, Default)]
struct LockTable {
    inner: Mutex<HashMap<BusId, Arc<BusLock<()>>>>,
}

impl LockTable {
    fn handle(&self, bus_id: BusId) -> Arc<BusLock<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(bus_id)
                .or_insert_with(|| Arc::new(BusLock::new(()))),
        )
    }
}

/// Rollback instructions for the index deltas applied so far, newest first.
type Unwind = Vec<(NaiveDate, i64, Version)>;

/// Validates and applies reserve / amend / cancel operations against the
/// inventory index under per-bus mutual exclusion, then commits to the
/// ledger store.
///
/// One long-lived instance per process (or per test); construct with
/// [`ReservationEngine::open`], which loads the ledger and rebuilds the
/// index. Multiple instances over distinct stores are fully independent.
pub struct ReservationEngine {
    ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    buses: Arc<HashMap<BusId, Bus>>,
    index: Arc<InventoryIndex>,
    bookings: Arc<RwLock<HashMap<BookingId, Booking>>>,
    locks: LockTable,
}

impl ReservationEngine {
    /// Load the ledger, rebuild the inventory index and start the engine.
    ///
    /// # Errors
    ///
    /// [`ReservationError::Storage`] if the ledger cannot be loaded.
    pub async fn open(
        ledger: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self, ReservationError> {
        let (buses, bookings) = ledger.load_all().await?;
        let index = InventoryIndex::rebuild(&buses, &bookings);
        tracing::info!(
            buses = buses.len(),
            bookings = bookings.len(),
            "ledger loaded, inventory index rebuilt"
        );

        Ok(Self {
            ledger,
            clock,
            config,
            buses: Arc::new(buses.into_iter().map(|b| (b.id, b)).collect()),
            index: Arc::new(index),
            bookings: Arc::new(RwLock::new(
                bookings.into_iter().map(|b| (b.id, b)).collect(),
            )),
            locks: LockTable::default(),
        })
    }

    /// Read-only views over the same committed state this engine mutates.
    #[must_use]
    pub fn queries(&self) -> QueryService {
        QueryService::new(
            Arc::clone(&self.buses),
            Arc::clone(&self.index),
            Arc::clone(&self.bookings),
        )
    }

    /// Reserve `seats` seats on (bus, date) for `passenger`.
    ///
    /// Returns the committed booking with its system-assigned identifier and
    /// timestamps. Two concurrent reservations can never jointly oversell a
    /// cell: the debit happens inside the per-bus critical section, and the
    /// ledger commit happens before the section is released.
    ///
    /// # Errors
    ///
    /// `InvalidSeatCount`, `UnknownBus`, `DateUnavailable`,
    /// `InsufficientSeats`, `Timeout`, `Conflict`, `Storage`.
    pub async fn reserve(
        &self,
        bus_id: BusId,
        date: NaiveDate,
        seats: u32,
        passenger: Passenger,
    ) -> Result<Booking, ReservationError> {
        self.validate_seat_count(seats)?;
        let bus = self
            .buses
            .get(&bus_id)
            .ok_or(ReservationError::UnknownBus(bus_id))?;
        if !bus.offers(date) {
            return Err(ReservationError::DateUnavailable { bus_id, date });
        }

        let _guard = self.acquire(bus_id).await?;

        let cell = self.index.cell(bus_id, date)?;
        if cell.remaining < seats {
            counter!(RESERVATIONS_TOTAL, "status" => "rejected").increment(1);
            tracing::debug!(
                bus = %bus_id,
                %date,
                requested = seats,
                available = cell.remaining,
                "reservation rejected: insufficient seats"
            );
            return Err(ReservationError::InsufficientSeats {
                requested: seats,
                available: cell.remaining,
            });
        }

        let (remaining, version) =
            self.index
                .apply_delta(bus_id, date, -i64::from(seats), cell.version)?;

        let now = self.clock.now();
        let booking = Booking {
            id: BookingId::new(),
            bus_id,
            date,
            seats,
            passenger,
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        };
        let changeset = Changeset::new(
            booking.clone(),
            vec![SeatUpdate {
                bus_id,
                date,
                remaining,
            }],
        );

        if let Err(err) = self.commit(changeset).await {
            self.unwind(bus_id, vec![(date, i64::from(seats), version)]);
            counter!(RESERVATIONS_TOTAL, "status" => "rejected").increment(1);
            return Err(err);
        }

        self.bookings_write().insert(booking.id, booking.clone());
        counter!(RESERVATIONS_TOTAL, "status" => "confirmed").increment(1);
        tracing::info!(
            booking = %booking.id,
            bus = %bus_id,
            %date,
            seats,
            remaining,
            "reservation confirmed"
        );
        Ok(booking)
    }

    /// Re-book an existing confirmed booking with new parameters.
    ///
    /// A same-date amendment applies the net seat delta; a date change
    /// credits the old cell and debits the new one as a single logically
    /// atomic step. If the new cell cannot absorb the debit the whole
    /// amendment fails with both cells untouched.
    ///
    /// # Errors
    ///
    /// `InvalidSeatCount`, `UnknownBooking`, `AlreadyCancelled`,
    /// `DateUnavailable`, `InsufficientSeats`, `Timeout`, `Conflict`,
    /// `Storage`.
    pub async fn amend(
        &self,
        booking_id: BookingId,
        new_seats: u32,
        new_date: NaiveDate,
        new_passenger: Passenger,
    ) -> Result<Booking, ReservationError> {
        self.validate_seat_count(new_seats)?;
        let bus_id = self
            .bookings_read()
            .get(&booking_id)
            .map(|b| b.bus_id)
            .ok_or(ReservationError::UnknownBooking(booking_id))?;

        let _guard = self.acquire(bus_id).await?;

        // Re-read under the lock: a concurrent cancel may have won the race
        // for the section.
        let booking = self
            .bookings_read()
            .get(&booking_id)
            .cloned()
            .ok_or(ReservationError::UnknownBooking(booking_id))?;
        if !booking.status.is_confirmed() {
            return Err(ReservationError::AlreadyCancelled(booking_id));
        }
        let bus = self
            .buses
            .get(&bus_id)
            .ok_or(ReservationError::UnknownBus(bus_id))?;
        if !bus.offers(new_date) {
            return Err(ReservationError::DateUnavailable {
                bus_id,
                date: new_date,
            });
        }

        let (seat_updates, unwind) = if new_date == booking.date {
            self.amend_same_date(&booking, new_seats)?
        } else {
            self.amend_across_dates(&booking, new_seats, new_date)?
        };

        let mut updated = booking;
        updated.seats = new_seats;
        updated.date = new_date;
        updated.passenger = new_passenger;
        updated.updated_at = self.clock.now();

        let changeset = Changeset::new(updated.clone(), seat_updates);
        if let Err(err) = self.commit(changeset).await {
            self.unwind(bus_id, unwind);
            counter!(AMENDMENTS_TOTAL, "status" => "rejected").increment(1);
            return Err(err);
        }

        self.bookings_write().insert(booking_id, updated.clone());
        counter!(AMENDMENTS_TOTAL, "status" => "applied").increment(1);
        tracing::info!(
            booking = %booking_id,
            bus = %bus_id,
            date = %updated.date,
            seats = updated.seats,
            "booking amended"
        );
        Ok(updated)
    }

    /// Cancel a confirmed booking and restore its capacity.
    ///
    /// Cancellation flips the status in place and retains the record for
    /// audit. Cancelling twice fails the second time with `AlreadyCancelled`
    /// and never credits capacity twice.
    ///
    /// # Errors
    ///
    /// `UnknownBooking`, `AlreadyCancelled`, `Timeout`, `Conflict`,
    /// `Storage`.
    pub async fn cancel(&self, booking_id: BookingId) -> Result<(), ReservationError> {
        let bus_id = self
            .bookings_read()
            .get(&booking_id)
            .map(|b| b.bus_id)
            .ok_or(ReservationError::UnknownBooking(booking_id))?;

        let _guard = self.acquire(bus_id).await?;

        let booking = self
            .bookings_read()
            .get(&booking_id)
            .cloned()
            .ok_or(ReservationError::UnknownBooking(booking_id))?;
        if !booking.status.is_confirmed() {
            return Err(ReservationError::AlreadyCancelled(booking_id));
        }

        let cell = self.index.cell(booking.bus_id, booking.date)?;
        let (remaining, version) = self.index.apply_delta(
            booking.bus_id,
            booking.date,
            i64::from(booking.seats),
            cell.version,
        )?;

        let mut updated = booking.clone();
        updated.status = BookingStatus::Cancelled;
        updated.updated_at = self.clock.now();

        let changeset = Changeset::new(
            updated.clone(),
            vec![SeatUpdate {
                bus_id: booking.bus_id,
                date: booking.date,
                remaining,
            }],
        );
        if let Err(err) = self.commit(changeset).await {
            self.unwind(
                bus_id,
                vec![(booking.date, -i64::from(booking.seats), version)],
            );
            return Err(err);
        }

        self.bookings_write().insert(booking_id, updated);
        counter!(CANCELLATIONS_TOTAL).increment(1);
        tracing::info!(
            booking = %booking_id,
            bus = %bus_id,
            date = %booking.date,
            seats = booking.seats,
            remaining,
            "booking cancelled, capacity restored"
        );
        Ok(())
    }

    /// Net seat delta against the booking's existing cell.
    fn amend_same_date(
        &self,
        booking: &Booking,
        new_seats: u32,
    ) -> Result<(Vec<SeatUpdate>, Unwind), ReservationError> {
        let cell = self.index.cell(booking.bus_id, booking.date)?;
        let net = i64::from(booking.seats) - i64::from(new_seats);
        if net < 0 {
            let extra = new_seats - booking.seats;
            if cell.remaining < extra {
                counter!(AMENDMENTS_TOTAL, "status" => "rejected").increment(1);
                return Err(ReservationError::InsufficientSeats {
                    requested: extra,
                    available: cell.remaining,
                });
            }
        }
        let (remaining, version) =
            self.index
                .apply_delta(booking.bus_id, booking.date, net, cell.version)?;
        Ok((
            vec![SeatUpdate {
                bus_id: booking.bus_id,
                date: booking.date,
                remaining,
            }],
            vec![(booking.date, -net, version)],
        ))
    }

    /// Credit the old cell and debit the new one; no partial application.
    fn amend_across_dates(
        &self,
        booking: &Booking,
        new_seats: u32,
        new_date: NaiveDate,
    ) -> Result<(Vec<SeatUpdate>, Unwind), ReservationError> {
        let old_cell = self.index.cell(booking.bus_id, booking.date)?;
        let new_cell = self.index.cell(booking.bus_id, new_date)?;
        if new_cell.remaining < new_seats {
            counter!(AMENDMENTS_TOTAL, "status" => "rejected").increment(1);
            return Err(ReservationError::InsufficientSeats {
                requested: new_seats,
                available: new_cell.remaining,
            });
        }

        let (old_remaining, old_version) = self.index.apply_delta(
            booking.bus_id,
            booking.date,
            i64::from(booking.seats),
            old_cell.version,
        )?;
        let (new_remaining, new_version) = match self.index.apply_delta(
            booking.bus_id,
            new_date,
            -i64::from(new_seats),
            new_cell.version,
        ) {
            Ok(applied) => applied,
            Err(err) => {
                // Leave the old cell exactly as it was before the call.
                self.unwind(
                    booking.bus_id,
                    vec![(booking.date, -i64::from(booking.seats), old_version)],
                );
                counter!(AMENDMENTS_TOTAL, "status" => "rejected").increment(1);
                return Err(err.into());
            }
        };

        Ok((
            vec![
                SeatUpdate {
                    bus_id: booking.bus_id,
                    date: booking.date,
                    remaining: old_remaining,
                },
                SeatUpdate {
                    bus_id: booking.bus_id,
                    date: new_date,
                    remaining: new_remaining,
                },
            ],
            vec![
                (new_date, i64::from(new_seats), new_version),
                (booking.date, -i64::from(booking.seats), old_version),
            ],
        ))
    }

    fn validate_seat_count(&self, seats: u32) -> Result<(), ReservationError> {
        if seats == 0 || seats > self.config.max_seats_per_booking {
            return Err(ReservationError::InvalidSeatCount {
                requested: seats,
                max: self.config.max_seats_per_booking,
            });
        }
        Ok(())
    }

    /// Enter the per-bus critical section, waiting at most the configured
    /// lock timeout. Nothing is touched before acquisition, so timing out
    /// has no side effect.
    async fn acquire(&self, bus_id: BusId) -> Result<OwnedMutexGuard<()>, ReservationError> {
        let handle = self.locks.handle(bus_id);
        timeout(self.config.lock_timeout, handle.lock_owned())
            .await
            .map_err(|_| ReservationError::Timeout(bus_id))
    }

    async fn commit(&self, changeset: Changeset) -> Result<(), ReservationError> {
        let started = Instant::now();
        let result = self.ledger.commit(changeset).await;
        histogram!(COMMIT_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        result.map_err(ReservationError::from)
    }

    /// Roll back index deltas after a failed durable commit. Runs inside the
    /// same critical section that applied them, so the expected versions
    /// cannot have moved.
    fn unwind(&self, bus_id: BusId, deltas: Unwind) {
        for (date, delta, expected) in deltas {
            if let Err(err) = self.index.apply_delta(bus_id, date, delta, expected) {
                tracing::error!(
                    bus = %bus_id,
                    %date,
                    delta,
                    %err,
                    "inventory rollback failed after storage failure"
                );
            }
        }
    }

    fn bookings_read(&self) -> RwLockReadGuard<'_, HashMap<BookingId, Booking>> {
        self.bookings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn bookings_write(&self) -> RwLockWriteGuard<'_, HashMap<BookingId, Booking>> {
        self.bookings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_table_hands_out_one_lock_per_bus() {
        let table = LockTable::default();
        let a1 = table.handle(BusId::new(1));
        let a2 = table.handle(BusId::new(1));
        let b = table.handle(BusId::new(2));

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }
}
