//! In-memory projection of remaining seats per (bus, date).
//!
//! The index answers "how many seats remain" and applies delta updates
//! atomically relative to all other deltas on the same cell. It is rebuilt
//! from the ledger at startup by replaying every confirmed booking against
//! each bus's nominal per-date capacity, and is never the system of record:
//! the ledger can always regenerate it.
//!
//! Every successful mutation bumps the cell's [`Version`]. The engine already
//! serialises writers per bus, so a version mismatch inside a critical
//! section indicates a stale read rather than a true race; the check is kept
//! as a cheap second line of defence and as an audit trail.

use crate::types::{Booking, Bus, BusId, Version};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors reported by index lookups and mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// The bus was never loaded into the index.
    #[error("Unknown bus: {0}")]
    UnknownBus(BusId),

    /// The bus is loaded but has no cell for the date.
    #[error("Bus {bus_id} has no inventory cell for {date}")]
    DateNotOffered {
        /// The bus that was asked for.
        bus_id: BusId,
        /// The date outside its offered set.
        date: NaiveDate,
    },

    /// Applying the delta would leave the cell outside `[0, total_seats]`.
    #[error("Capacity exceeded on bus {bus_id} {date}: requested {requested}, available {available}")]
    CapacityExceeded {
        /// The cell's bus.
        bus_id: BusId,
        /// The cell's date.
        date: NaiveDate,
        /// Magnitude of the rejected delta.
        requested: u32,
        /// Headroom in the direction of the delta.
        available: u32,
    },

    /// The stored version does not match the version the caller read.
    #[error("Version conflict on bus {bus_id} {date}: expected {expected}, found {actual}")]
    VersionConflict {
        /// The cell's bus.
        bus_id: BusId,
        /// The cell's date.
        date: NaiveDate,
        /// The version the mutation was validated against.
        expected: Version,
        /// The version actually stored.
        actual: Version,
    },
}

/// One (bus, date) entry: seats remaining plus its mutation counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeatCell {
    /// Seats still available for sale.
    pub remaining: u32,
    /// Incremented on every successful mutation.
    pub version: Version,
}

/// Per-bus cell block. `total_seats` bounds every cell of the bus.
#[derive(Debug)]
struct BusCells {
    total_seats: u32,
    cells: BTreeMap<NaiveDate, SeatCell>,
}

/// Remaining-seat counters for every loaded bus, safe for concurrent use.
///
/// Readers (the query service) and writers (the engine, already serialised
/// per bus) share the map through a short-critical-section `RwLock`; no lock
/// is ever held across an await point.
#[derive(Debug, Default)]
pub struct InventoryIndex {
    inner: RwLock<HashMap<BusId, BusCells>>,
}

impl InventoryIndex {
    /// Build the index by replaying confirmed bookings against nominal
    /// capacity.
    ///
    /// Every offered date starts at `total_seats` and each confirmed booking
    /// debits its cell. If the replayed value disagrees with the remaining
    /// count persisted on the bus record, the replay wins and the
    /// disagreement is logged; this makes a ledger written by an older
    /// process loadable with no manual repair step.
    #[must_use]
    pub fn rebuild(buses: &[Bus], bookings: &[Booking]) -> Self {
        let mut map: HashMap<BusId, BusCells> = HashMap::with_capacity(buses.len());
        for bus in buses {
            let cells = bus
                .schedule
                .keys()
                .map(|date| {
                    (
                        *date,
                        SeatCell {
                            remaining: bus.total_seats,
                            version: Version::INITIAL,
                        },
                    )
                })
                .collect();
            map.insert(
                bus.id,
                BusCells {
                    total_seats: bus.total_seats,
                    cells,
                },
            );
        }

        for booking in bookings.iter().filter(|b| b.status.is_confirmed()) {
            let Some(block) = map.get_mut(&booking.bus_id) else {
                tracing::warn!(
                    booking = %booking.id,
                    bus = %booking.bus_id,
                    "confirmed booking references a bus missing from the ledger; skipped"
                );
                continue;
            };
            let Some(cell) = block.cells.get_mut(&booking.date) else {
                tracing::warn!(
                    booking = %booking.id,
                    bus = %booking.bus_id,
                    date = %booking.date,
                    "confirmed booking references a date the bus does not offer; skipped"
                );
                continue;
            };
            if cell.remaining < booking.seats {
                tracing::warn!(
                    booking = %booking.id,
                    bus = %booking.bus_id,
                    date = %booking.date,
                    remaining = cell.remaining,
                    seats = booking.seats,
                    "replay would oversell; clamping cell to zero"
                );
                cell.remaining = 0;
            } else {
                cell.remaining -= booking.seats;
            }
        }

        for bus in buses {
            if let Some(block) = map.get(&bus.id) {
                for (date, stored) in &bus.schedule {
                    let replayed = block.cells.get(date).map(|c| c.remaining);
                    if replayed != Some(*stored) {
                        tracing::warn!(
                            bus = %bus.id,
                            date = %date,
                            stored,
                            replayed,
                            "persisted remaining disagrees with booking replay; replay wins"
                        );
                    }
                }
            }
        }

        Self {
            inner: RwLock::new(map),
        }
    }

    /// Seats remaining for (bus, date).
    ///
    /// Returns 0 for a date the bus never offers, which is distinct from an
    /// unloaded bus.
    ///
    /// # Errors
    ///
    /// [`IndexError::UnknownBus`] if the bus was never loaded.
    pub fn remaining(&self, bus_id: BusId, date: NaiveDate) -> Result<u32, IndexError> {
        let map = self.read();
        let block = map.get(&bus_id).ok_or(IndexError::UnknownBus(bus_id))?;
        Ok(block.cells.get(&date).map_or(0, |c| c.remaining))
    }

    /// Snapshot one cell (remaining and version) for a read-then-apply cycle.
    ///
    /// # Errors
    ///
    /// [`IndexError::UnknownBus`] or [`IndexError::DateNotOffered`].
    pub fn cell(&self, bus_id: BusId, date: NaiveDate) -> Result<SeatCell, IndexError> {
        let map = self.read();
        let block = map.get(&bus_id).ok_or(IndexError::UnknownBus(bus_id))?;
        block
            .cells
            .get(&date)
            .copied()
            .ok_or(IndexError::DateNotOffered { bus_id, date })
    }

    /// Apply `remaining += delta` to one cell, guarded by bounds and the
    /// optimistic version check.
    ///
    /// Returns the new remaining count and the new version.
    ///
    /// # Errors
    ///
    /// - [`IndexError::UnknownBus`] / [`IndexError::DateNotOffered`] for a
    ///   missing cell
    /// - [`IndexError::VersionConflict`] if `expected` is stale (retry with a
    ///   fresh read)
    /// - [`IndexError::CapacityExceeded`] if the result would leave
    ///   `[0, total_seats]`
    pub fn apply_delta(
        &self,
        bus_id: BusId,
        date: NaiveDate,
        delta: i64,
        expected: Version,
    ) -> Result<(u32, Version), IndexError> {
        let mut map = self.write();
        let block = map.get_mut(&bus_id).ok_or(IndexError::UnknownBus(bus_id))?;
        let total = block.total_seats;
        let cell = block
            .cells
            .get_mut(&date)
            .ok_or(IndexError::DateNotOffered { bus_id, date })?;

        if cell.version != expected {
            return Err(IndexError::VersionConflict {
                bus_id,
                date,
                expected,
                actual: cell.version,
            });
        }

        let next = i64::from(cell.remaining) + delta;
        if next < 0 || next > i64::from(total) {
            let available = if delta < 0 {
                cell.remaining
            } else {
                total - cell.remaining
            };
            return Err(IndexError::CapacityExceeded {
                bus_id,
                date,
                requested: delta.unsigned_abs().try_into().unwrap_or(u32::MAX),
                available,
            });
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            cell.remaining = next as u32;
        }
        cell.version = cell.version.next();
        Ok((cell.remaining, cell.version))
    }

    /// Dates of this bus that still have seats left, oldest first.
    ///
    /// Exhausted dates are withheld here but retained internally, so a later
    /// cancellation can bring them back.
    ///
    /// # Errors
    ///
    /// [`IndexError::UnknownBus`] if the bus was never loaded.
    pub fn offered_dates(&self, bus_id: BusId) -> Result<Vec<NaiveDate>, IndexError> {
        let map = self.read();
        let block = map.get(&bus_id).ok_or(IndexError::UnknownBus(bus_id))?;
        Ok(block
            .cells
            .iter()
            .filter(|(_, cell)| cell.remaining > 0)
            .map(|(date, _)| *date)
            .collect())
    }

    /// Full remaining-seat map for one bus, used to build ledger changesets.
    ///
    /// # Errors
    ///
    /// [`IndexError::UnknownBus`] if the bus was never loaded.
    pub fn remaining_map(&self, bus_id: BusId) -> Result<BTreeMap<NaiveDate, u32>, IndexError> {
        let map = self.read();
        let block = map.get(&bus_id).ok_or(IndexError::UnknownBus(bus_id))?;
        Ok(block
            .cells
            .iter()
            .map(|(date, cell)| (*date, cell.remaining))
            .collect())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<BusId, BusCells>> {
        self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<BusId, BusCells>> {
        self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{BookingId, BookingStatus, Passenger};
    use chrono::{NaiveTime, Utc};
    use std::collections::BTreeMap;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn sample_bus(id: u32, total: u32, days: &[u32]) -> Bus {
        Bus {
            id: BusId::new(id),
            origin: "Pune".to_string(),
            destination: "Mumbai".to_string(),
            departure: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            operator: "Purple Travels".to_string(),
            service_class: "AC Seater".to_string(),
            fare: 400,
            total_seats: total,
            schedule: days.iter().map(|d| (date(*d), total)).collect(),
        }
    }

    fn confirmed(bus: &Bus, day: u32, seats: u32) -> Booking {
        let now = Utc::now();
        Booking {
            id: BookingId::new(),
            bus_id: bus.id,
            date: date(day),
            seats,
            passenger: Passenger::new("Asha Rao", "asha@example.com", "9876500000"),
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rebuild_replays_confirmed_bookings() {
        let bus = sample_bus(1, 10, &[15, 16]);
        let bookings = vec![confirmed(&bus, 15, 3), confirmed(&bus, 15, 2)];
        let index = InventoryIndex::rebuild(&[bus], &bookings);

        assert_eq!(index.remaining(BusId::new(1), date(15)).unwrap(), 5);
        assert_eq!(index.remaining(BusId::new(1), date(16)).unwrap(), 10);
    }

    #[test]
    fn rebuild_ignores_cancelled_bookings() {
        let bus = sample_bus(1, 10, &[15]);
        let mut booking = confirmed(&bus, 15, 4);
        booking.status = BookingStatus::Cancelled;
        let index = InventoryIndex::rebuild(&[bus], &[booking]);

        assert_eq!(index.remaining(BusId::new(1), date(15)).unwrap(), 10);
    }

    #[test]
    fn never_offered_date_reads_zero() {
        let bus = sample_bus(1, 10, &[15]);
        let index = InventoryIndex::rebuild(&[bus], &[]);

        assert_eq!(index.remaining(BusId::new(1), date(20)).unwrap(), 0);
        assert_eq!(
            index.remaining(BusId::new(2), date(15)),
            Err(IndexError::UnknownBus(BusId::new(2)))
        );
    }

    #[test]
    fn apply_delta_debits_and_credits() {
        let bus = sample_bus(1, 10, &[15]);
        let index = InventoryIndex::rebuild(&[bus], &[]);
        let cell = index.cell(BusId::new(1), date(15)).unwrap();

        let (remaining, version) = index
            .apply_delta(BusId::new(1), date(15), -4, cell.version)
            .unwrap();
        assert_eq!(remaining, 6);
        assert_eq!(version, Version::new(1));

        let (remaining, version) = index
            .apply_delta(BusId::new(1), date(15), 4, version)
            .unwrap();
        assert_eq!(remaining, 10);
        assert_eq!(version, Version::new(2));
    }

    #[test]
    fn apply_delta_rejects_overdraw_and_overfill() {
        let bus = sample_bus(1, 5, &[15]);
        let index = InventoryIndex::rebuild(&[bus], &[]);
        let cell = index.cell(BusId::new(1), date(15)).unwrap();

        let err = index
            .apply_delta(BusId::new(1), date(15), -6, cell.version)
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::CapacityExceeded {
                requested: 6,
                available: 5,
                ..
            }
        ));

        let err = index
            .apply_delta(BusId::new(1), date(15), 1, cell.version)
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::CapacityExceeded {
                requested: 1,
                available: 0,
                ..
            }
        ));

        // Failed attempts must not bump the version.
        assert_eq!(
            index.cell(BusId::new(1), date(15)).unwrap().version,
            Version::INITIAL
        );
    }

    #[test]
    fn stale_version_is_rejected() {
        let bus = sample_bus(1, 10, &[15]);
        let index = InventoryIndex::rebuild(&[bus], &[]);
        let stale = index.cell(BusId::new(1), date(15)).unwrap().version;

        index
            .apply_delta(BusId::new(1), date(15), -1, stale)
            .unwrap();
        let err = index
            .apply_delta(BusId::new(1), date(15), -1, stale)
            .unwrap_err();
        assert!(matches!(err, IndexError::VersionConflict { .. }));
    }

    #[test]
    fn exhausted_dates_are_withheld_from_offers() {
        let bus = sample_bus(1, 2, &[15, 16]);
        let index = InventoryIndex::rebuild(&[bus], &[]);
        let cell = index.cell(BusId::new(1), date(15)).unwrap();
        index
            .apply_delta(BusId::new(1), date(15), -2, cell.version)
            .unwrap();

        assert_eq!(index.offered_dates(BusId::new(1)).unwrap(), vec![date(16)]);

        let map: BTreeMap<_, _> = index.remaining_map(BusId::new(1)).unwrap();
        assert_eq!(map.get(&date(15)), Some(&0));
        assert_eq!(map.get(&date(16)), Some(&2));
    }
}
