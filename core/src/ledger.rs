//! Ledger store contract: the durable record of buses and bookings.
//!
//! The ledger is the only component that touches persistent state. It exposes
//! exactly what the reservation engine needs:
//!
//! - load the full state once at startup (`load_all`)
//! - durably apply one [`Changeset`] at a time (`commit`)
//!
//! A changeset couples a booking upsert with the seat-cell writes that paid
//! for it, and `commit` must be atomic from the caller's perspective: after a
//! crash the store reloads either with the whole changeset applied or with
//! none of it, never with capacity and booking records disagreeing. The
//! concrete layout (single document with atomic rename, append-only journal,
//! embedded database) is the implementation's choice.
//!
//! # Implementations
//!
//! - `FileLedger` (in `busline-filestore`): durable single-document store
//! - `MemoryLedger` (in `busline-testing`): fast, deterministic testing

use crate::types::{Booking, Bus, BusId};
use chrono::NaiveDate;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Underlying I/O failed (read, write, rename, sync).
    #[error("I/O error: {0}")]
    Io(String),

    /// State could not be serialized for writing.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The persisted document exists but cannot be understood.
    #[error("Corrupt ledger: {0}")]
    Corrupt(String),
}

/// One seat-cell write: the new remaining count for a (bus, date).
///
/// Absolute values rather than deltas, so replaying a changeset is
/// idempotent and the store never has to do arithmetic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeatUpdate {
    /// The cell's bus.
    pub bus_id: BusId,
    /// The cell's date.
    pub date: NaiveDate,
    /// Seats remaining after the mutation.
    pub remaining: u32,
}

/// The unit of durability: a booking upsert plus the seat-cell writes that
/// belong to the same mutation.
///
/// A reserve or cancel carries one [`SeatUpdate`]; an amendment that moves a
/// booking to a different date carries two (credit the old cell, debit the
/// new one).
#[derive(Clone, Debug)]
pub struct Changeset {
    /// The booking as it must appear after the commit.
    pub booking: Booking,
    /// Seat cells to rewrite alongside the booking.
    pub seat_updates: Vec<SeatUpdate>,
}

impl Changeset {
    /// Create a changeset for `booking` with its capacity writes.
    #[must_use]
    pub const fn new(booking: Booking, seat_updates: Vec<SeatUpdate>) -> Self {
        Self {
            booking,
            seat_updates,
        }
    }
}

/// Durable store of bus capacity snapshots and booking records.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine shares the store behind
/// an `Arc<dyn LedgerStore>` across concurrent request handlers.
///
/// # Dyn Compatibility
///
/// The trait uses explicit `Pin<Box<dyn Future>>` returns instead of
/// `async fn` so it stays usable as a trait object.
///
/// # Example
///
/// ```no_run
/// use busline_core::ledger::{LedgerError, LedgerStore};
///
/// async fn boot<L: LedgerStore>(store: &L) -> Result<usize, LedgerError> {
///     let (buses, bookings) = store.load_all().await?;
///     Ok(buses.len() + bookings.len())
/// }
/// ```
pub trait LedgerStore: Send + Sync {
    /// Load every bus and booking known to the store.
    ///
    /// Called once at startup; the result seeds the inventory index and the
    /// booking registry. A store that has never been written to returns its
    /// seed state rather than an error.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Io`]: the backing medium could not be read
    /// - [`LedgerError::Corrupt`]: the persisted document cannot be parsed
    fn load_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(Vec<Bus>, Vec<Booking>), LedgerError>> + Send + '_>>;

    /// Durably apply one changeset.
    ///
    /// Either the whole changeset (booking upsert + capacity writes) is
    /// durable when this resolves `Ok`, or none of it is. The engine calls
    /// this inside the per-bus critical section and rolls its in-memory
    /// state back on failure.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Io`]: the write or atomic replace failed
    /// - [`LedgerError::Serialization`]: state could not be encoded
    fn commit(
        &self,
        changeset: Changeset,
    ) -> Pin<Box<dyn Future<Output = Result<(), LedgerError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_error_display() {
        let err = LedgerError::Corrupt("unexpected end of file".to_string());
        assert!(format!("{err}").contains("unexpected end of file"));
    }
}
