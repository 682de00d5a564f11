//! Sample fleet used to initialise an empty ledger.
//!
//! Route facts mirror the operator's launch network. Each route offers a
//! short window of departures starting at the date the caller supplies, so a
//! freshly seeded system always has bookable inventory.

use crate::types::{Bus, BusId};
use chrono::{Days, NaiveDate, NaiveTime};
use std::collections::BTreeMap;

struct Route {
    id: u32,
    origin: &'static str,
    destination: &'static str,
    departure: (u32, u32),
    fare: u32,
    total_seats: u32,
    operator: &'static str,
    service_class: &'static str,
    days_offered: u64,
}

const ROUTES: &[Route] = &[
    Route {
        id: 1,
        origin: "Mumbai",
        destination: "Delhi",
        departure: (21, 0),
        fare: 1500,
        total_seats: 45,
        operator: "IndiGo Bus Services",
        service_class: "Sleeper AC",
        days_offered: 5,
    },
    Route {
        id: 2,
        origin: "Bangalore",
        destination: "Chennai",
        departure: (20, 30),
        fare: 800,
        total_seats: 38,
        operator: "SRS Travels",
        service_class: "Semi-Sleeper AC",
        days_offered: 4,
    },
    Route {
        id: 3,
        origin: "Delhi",
        destination: "Jaipur",
        departure: (19, 0),
        fare: 600,
        total_seats: 40,
        operator: "Rajasthan Travels",
        service_class: "AC Seater",
        days_offered: 3,
    },
    Route {
        id: 4,
        origin: "Hyderabad",
        destination: "Bangalore",
        departure: (22, 0),
        fare: 1200,
        total_seats: 35,
        operator: "Orange Travels",
        service_class: "Volvo AC Sleeper",
        days_offered: 4,
    },
    Route {
        id: 5,
        origin: "Kolkata",
        destination: "Varanasi",
        departure: (20, 0),
        fare: 1100,
        total_seats: 42,
        operator: "Bengal Express",
        service_class: "AC Sleeper",
        days_offered: 3,
    },
    Route {
        id: 6,
        origin: "Chennai",
        destination: "Coimbatore",
        departure: (21, 30),
        fare: 750,
        total_seats: 36,
        operator: "KPN Travels",
        service_class: "AC Semi-Sleeper",
        days_offered: 4,
    },
    Route {
        id: 7,
        origin: "Pune",
        destination: "Mumbai",
        departure: (18, 0),
        fare: 400,
        total_seats: 45,
        operator: "Purple Travels",
        service_class: "AC Seater",
        days_offered: 3,
    },
    Route {
        id: 8,
        origin: "Ahmedabad",
        destination: "Mumbai",
        departure: (20, 0),
        fare: 1000,
        total_seats: 40,
        operator: "Gujarat Travels",
        service_class: "Volvo AC Sleeper",
        days_offered: 4,
    },
];

/// Build the sample fleet with departure windows starting at `first_day`.
///
/// Every offered date starts at the route's full nominal capacity.
#[must_use]
pub fn sample_fleet(first_day: NaiveDate) -> Vec<Bus> {
    ROUTES
        .iter()
        .map(|route| {
            let schedule: BTreeMap<NaiveDate, u32> = (0..route.days_offered)
                .filter_map(|offset| first_day.checked_add_days(Days::new(offset)))
                .map(|date| (date, route.total_seats))
                .collect();
            Bus {
                id: BusId::new(route.id),
                origin: route.origin.to_string(),
                destination: route.destination.to_string(),
                departure: NaiveTime::from_hms_opt(route.departure.0, route.departure.1, 0)
                    .unwrap_or_default(),
                operator: route.operator.to_string(),
                service_class: route.service_class.to_string(),
                fare: route.fare,
                total_seats: route.total_seats,
                schedule,
            }
        })
        .collect()
}
