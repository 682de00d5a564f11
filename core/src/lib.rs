//! # Busline Core
//!
//! Reservation core for seats on scheduled bus departures: a perishable,
//! finite resource sold concurrently to many clients. The crate guarantees
//! that capacity is never oversold, that cancellations restore exactly what
//! they held, and that every mutation is durably recorded before it becomes
//! visible.
//!
//! ## Components
//!
//! - [`ledger`]: durable record of buses and bookings; the only component
//!   that touches persistent state. Implementations live in sibling crates
//!   (`busline-filestore` for production, `busline-testing` in tests).
//! - [`inventory`]: in-memory remaining-seat projection per (bus, date),
//!   rebuilt from the ledger at startup and versioned for optimistic
//!   concurrency detection.
//! - [`engine`]: the sole entry point for mutations. Validates and applies
//!   reserve / amend / cancel under a per-bus critical section, then commits
//!   through the ledger before releasing.
//! - [`query`]: lock-free read-only views (bus list, bus detail, bookings).
//!
//! ## Example
//!
//! ```no_run
//! use busline_core::{
//!     BusId, EngineConfig, Passenger, ReservationEngine, ReservationError, SystemClock,
//! };
//! use busline_core::ledger::LedgerStore;
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! async fn example(
//!     ledger: Arc<dyn LedgerStore>,
//!     date: NaiveDate,
//! ) -> Result<(), ReservationError> {
//!     let engine = ReservationEngine::open(
//!         ledger,
//!         Arc::new(SystemClock),
//!         EngineConfig::default(),
//!     )
//!     .await?;
//!
//!     let booking = engine
//!         .reserve(
//!             BusId::new(1),
//!             date,
//!             2,
//!             Passenger::new("Asha Rao", "asha@example.com", "9876500000"),
//!         )
//!         .await?;
//!     engine.cancel(booking.id).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod metrics;
pub mod query;
pub mod seed;
pub mod types;

pub use config::EngineConfig;
pub use engine::ReservationEngine;
pub use environment::{Clock, SystemClock};
pub use error::ReservationError;
pub use inventory::{IndexError, InventoryIndex, SeatCell};
pub use ledger::{Changeset, LedgerError, LedgerStore, SeatUpdate};
pub use query::{BookingFilter, BusDetail, BusSort, BusSummary, QueryService};
pub use types::{
    Booking, BookingId, BookingStatus, Bus, BusId, Passenger, Version,
};
