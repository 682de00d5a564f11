//! Domain types for the Busline reservation core.
//!
//! This module contains the identifier newtypes, value objects and entities
//! shared by the inventory index, the reservation engine, the ledger contract
//! and the query service.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a scheduled bus route.
///
/// Buses are created by an administrative loader and never deleted, so plain
/// numeric identifiers (as carried by the seeded fleet) are sufficient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BusId(u32);

impl BusId {
    /// Create a `BusId` from its numeric value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the numeric value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BusId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Unique identifier for a booking.
///
/// System-assigned at reservation time; random UUIDs cannot collide under
/// concurrent creation the way wall-clock-derived identifiers can.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutation counter for one inventory cell, used for optimistic concurrency
/// detection and audit.
///
/// Versions start at 0 and increment by 1 on every successful mutation of the
/// cell. A caller that read version `n` and asks for a delta against version
/// `n` will be rejected if another mutation got there first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The initial version (0) for a freshly loaded cell.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    ///
    /// Reaching `u64::MAX` mutations on a single cell is not a realistic
    /// concern, so plain addition is used.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================================================
// Value objects
// ============================================================================

/// Contact details of the passenger a booking is held for.
///
/// The core assumes a trusted caller has already validated these fields; they
/// are carried opaquely through the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passenger {
    /// Full name.
    pub name: String,
    /// Contact e-mail address.
    pub email: String,
    /// Contact phone number.
    pub phone: String,
}

impl Passenger {
    /// Creates a new `Passenger`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A scheduled route offering with a nominal seat capacity per offered date.
///
/// Route facts are immutable; the only mutable state is the per-date
/// remaining-seat map in `schedule`, and the reservation engine is its sole
/// writer. A date stays in `schedule` even at zero remaining so that a later
/// cancellation can restore it; browsing clients only ever see the dates with
/// seats left (see [`crate::query::QueryService::bus_detail`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bus {
    /// Route identifier.
    pub id: BusId,
    /// City of departure.
    pub origin: String,
    /// City of arrival.
    pub destination: String,
    /// Scheduled departure time (same for every offered date).
    pub departure: NaiveTime,
    /// Operating company.
    pub operator: String,
    /// Service class, e.g. "Volvo AC Sleeper".
    pub service_class: String,
    /// Fare per seat in minor currency units.
    pub fare: u32,
    /// Nominal seat capacity per offered date.
    pub total_seats: u32,
    /// Seats remaining per offered calendar date.
    pub schedule: BTreeMap<NaiveDate, u32>,
}

impl Bus {
    /// Whether the bus runs on `date` at all (regardless of seats left).
    #[must_use]
    pub fn offers(&self, date: NaiveDate) -> bool {
        self.schedule.contains_key(&date)
    }
}

/// Lifecycle status of a booking.
///
/// There is no persisted `Pending` state: a reservation either commits as
/// `Confirmed` or is rejected without side effect. Cancellation flips the
/// status in place; the record is retained for audit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Seats are held and capacity has been debited.
    Confirmed,
    /// The hold was released and capacity credited back.
    Cancelled,
}

impl BookingStatus {
    /// Whether this status still holds capacity.
    #[must_use]
    pub const fn is_confirmed(self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed => write!(f, "confirmed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A passenger's reservation of `seats` seats on one bus/date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// System-assigned identifier.
    pub id: BookingId,
    /// The bus the seats are held on.
    pub bus_id: BusId,
    /// Travel date.
    pub date: NaiveDate,
    /// Number of seats held.
    pub seats: u32,
    /// Who the seats are held for.
    pub passenger: Passenger,
    /// Current lifecycle status.
    pub status: BookingStatus,
    /// When the booking was committed.
    pub created_at: DateTime<Utc>,
    /// When the booking was last amended or cancelled.
    pub updated_at: DateTime<Utc>,
}
