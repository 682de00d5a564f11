//! Failure taxonomy for reservation operations.
//!
//! Every operation on the reservation engine reports failures as a typed
//! [`ReservationError`], never as a stringly-typed catch-all. Callers can
//! rely on [`ReservationError::is_retryable`] to decide whether re-submitting
//! the same request can succeed: only version races and lock-wait timeouts
//! are safe to retry; every other kind is terminal for that request.

use crate::inventory::IndexError;
use crate::ledger::LedgerError;
use crate::types::{BookingId, BusId, Version};
use chrono::NaiveDate;
use thiserror::Error;

/// Errors reported by the reservation engine and query service.
#[derive(Error, Debug)]
pub enum ReservationError {
    /// The referenced bus was never loaded into the system.
    #[error("Unknown bus: {0}")]
    UnknownBus(BusId),

    /// The referenced booking does not exist.
    #[error("Unknown booking: {0}")]
    UnknownBooking(BookingId),

    /// The bus does not run on the requested date.
    #[error("Bus {bus_id} does not run on {date}")]
    DateUnavailable {
        /// The bus that was asked for.
        bus_id: BusId,
        /// The date outside its offered set.
        date: NaiveDate,
    },

    /// Fewer seats remain than the request asked for.
    #[error("Insufficient seats: requested {requested}, available {available}")]
    InsufficientSeats {
        /// Seats the caller asked for.
        requested: u32,
        /// Seats actually remaining at validation time.
        available: u32,
    },

    /// The booking was already cancelled; capacity is not credited twice.
    #[error("Booking {0} is already cancelled")]
    AlreadyCancelled(BookingId),

    /// The requested seat count is outside the accepted range.
    #[error("Invalid seat count: requested {requested}, accepted range is 1..={max}")]
    InvalidSeatCount {
        /// Seats the caller asked for.
        requested: u32,
        /// Configured per-booking maximum.
        max: u32,
    },

    /// Optimistic-version race: the inventory cell changed between read and
    /// write. Safe for the caller to retry with a fresh read.
    #[error("Version conflict: expected {expected}, found {actual}")]
    Conflict {
        /// The version the mutation was validated against.
        expected: Version,
        /// The version actually stored.
        actual: Version,
    },

    /// The per-bus lock could not be acquired within the configured wait.
    /// No state was touched; safe to retry.
    #[error("Timed out waiting for the bus {0} critical section")]
    Timeout(BusId),

    /// The durable commit failed. The in-memory index has been rolled back so
    /// it never runs ahead of the ledger; the operation is lost but the
    /// process stays healthy.
    #[error("Storage failure: {0}")]
    Storage(#[from] LedgerError),
}

impl ReservationError {
    /// Whether re-submitting the identical request can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Timeout(_))
    }
}

impl From<IndexError> for ReservationError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::UnknownBus(bus_id) => Self::UnknownBus(bus_id),
            IndexError::DateNotOffered { bus_id, date } => Self::DateUnavailable { bus_id, date },
            IndexError::CapacityExceeded {
                requested,
                available,
                ..
            } => Self::InsufficientSeats {
                requested,
                available,
            },
            IndexError::VersionConflict {
                expected, actual, ..
            } => Self::Conflict { expected, actual },
        }
    }
}
