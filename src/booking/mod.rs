//! Appointment-booking-by-email: extraction, typed pending payload, and the
//! turn-based agent.

pub mod agent;
pub mod extract;
pub mod payload;

pub use agent::BookingEmailAgent;
pub use payload::{BOOKING_ACTION_TYPE, BOOKING_TTL_MINUTES, BookingPayload};
