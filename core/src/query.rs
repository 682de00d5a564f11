//! Read-only projections over the committed state.
//!
//! The query service shares the bus catalogue, the inventory index and the
//! booking registry with the engine but never takes the engine's per-bus
//! locks: reads see the latest committed snapshot ("read committed") and mix
//! freely with queued write traffic.

use crate::error::ReservationError;
use crate::inventory::InventoryIndex;
use crate::types::{Booking, BookingId, Bus, BusId};
use chrono::{NaiveDate, NaiveTime};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Sort order for the bus list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusSort {
    /// Cheapest fare first.
    Fare,
    /// Earliest departure time first.
    Departure,
}

/// Optional narrowing of the booking list.
#[derive(Clone, Debug, Default)]
pub struct BookingFilter {
    /// Only bookings held for this passenger e-mail.
    pub passenger_email: Option<String>,
    /// Only bookings on this bus.
    pub bus_id: Option<BusId>,
}

/// Route facts surfaced to browsing clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusSummary {
    /// Route identifier.
    pub id: BusId,
    /// City of departure.
    pub origin: String,
    /// City of arrival.
    pub destination: String,
    /// Scheduled departure time.
    pub departure: NaiveTime,
    /// Operating company.
    pub operator: String,
    /// Service class.
    pub service_class: String,
    /// Fare per seat in minor currency units.
    pub fare: u32,
    /// Nominal seat capacity per offered date.
    pub total_seats: u32,
}

impl From<&Bus> for BusSummary {
    fn from(bus: &Bus) -> Self {
        Self {
            id: bus.id,
            origin: bus.origin.clone(),
            destination: bus.destination.clone(),
            departure: bus.departure,
            operator: bus.operator.clone(),
            service_class: bus.service_class.clone(),
            fare: bus.fare,
            total_seats: bus.total_seats,
        }
    }
}

/// One bus with the dates that still have seats left.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusDetail {
    /// Route facts.
    pub bus: BusSummary,
    /// Offered dates with remaining capacity, oldest first. Exhausted dates
    /// are withheld here the instant their last seat goes, because the set
    /// is computed from `remaining > 0` at read time.
    pub offered_dates: Vec<NaiveDate>,
}

/// Lock-free read views; cheap to clone and hand to request handlers.
#[derive(Clone)]
pub struct QueryService {
    buses: Arc<HashMap<BusId, Bus>>,
    index: Arc<InventoryIndex>,
    bookings: Arc<RwLock<HashMap<BookingId, Booking>>>,
}

impl QueryService {
    pub(crate) fn new(
        buses: Arc<HashMap<BusId, Bus>>,
        index: Arc<InventoryIndex>,
        bookings: Arc<RwLock<HashMap<BookingId, Booking>>>,
    ) -> Self {
        Self {
            buses,
            index,
            bookings,
        }
    }

    /// All buses, optionally sorted; unsorted lists come back in id order.
    #[must_use]
    pub fn list_buses(&self, sort: Option<BusSort>) -> Vec<BusSummary> {
        let mut buses: Vec<BusSummary> = self.buses.values().map(BusSummary::from).collect();
        match sort {
            Some(BusSort::Fare) => buses.sort_by_key(|b| (b.fare, b.id)),
            Some(BusSort::Departure) => buses.sort_by_key(|b| (b.departure, b.id)),
            None => buses.sort_by_key(|b| b.id),
        }
        buses
    }

    /// Buses running `origin` to `destination`, case-insensitively, in id
    /// order.
    #[must_use]
    pub fn find_buses(&self, origin: &str, destination: &str) -> Vec<BusSummary> {
        let mut buses: Vec<BusSummary> = self
            .buses
            .values()
            .filter(|bus| {
                bus.origin.eq_ignore_ascii_case(origin)
                    && bus.destination.eq_ignore_ascii_case(destination)
            })
            .map(BusSummary::from)
            .collect();
        buses.sort_by_key(|b| b.id);
        buses
    }

    /// One bus with its currently offered (non-exhausted) dates.
    ///
    /// # Errors
    ///
    /// [`ReservationError::UnknownBus`] if the bus was never loaded.
    pub fn bus_detail(&self, bus_id: BusId) -> Result<BusDetail, ReservationError> {
        let bus = self
            .buses
            .get(&bus_id)
            .ok_or(ReservationError::UnknownBus(bus_id))?;
        let offered_dates = self.index.offered_dates(bus_id)?;
        Ok(BusDetail {
            bus: BusSummary::from(bus),
            offered_dates,
        })
    }

    /// Seats remaining for one (bus, date); 0 for a date the bus never
    /// offers.
    ///
    /// # Errors
    ///
    /// [`ReservationError::UnknownBus`] if the bus was never loaded.
    pub fn seats_remaining(&self, bus_id: BusId, date: NaiveDate) -> Result<u32, ReservationError> {
        Ok(self.index.remaining(bus_id, date)?)
    }

    /// Bookings matching `filter`, newest first. Cancelled bookings are
    /// included; they are part of the audit trail.
    #[must_use]
    pub fn list_bookings(&self, filter: &BookingFilter) -> Vec<Booking> {
        let registry = self
            .bookings
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut bookings: Vec<Booking> = registry
            .values()
            .filter(|b| {
                filter
                    .passenger_email
                    .as_ref()
                    .is_none_or(|email| b.passenger.email.eq_ignore_ascii_case(email))
            })
            .filter(|b| filter.bus_id.is_none_or(|bus_id| b.bus_id == bus_id))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.as_uuid().cmp(b.id.as_uuid())));
        bookings
    }

    /// Look one booking up by id.
    ///
    /// # Errors
    ///
    /// [`ReservationError::UnknownBooking`] if no such booking exists.
    pub fn booking(&self, booking_id: BookingId) -> Result<Booking, ReservationError> {
        self.bookings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&booking_id)
            .cloned()
            .ok_or(ReservationError::UnknownBooking(booking_id))
    }
}
