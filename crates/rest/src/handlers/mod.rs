//! HTTP request handlers.
//!
//! - [`signup`] - Create a user together with their profile media
//! - [`bookings`] - Book tickets for an event
//! - [`health`] - Health and liveness probes

pub mod bookings;
pub mod health;
pub mod signup;

// Re-export handlers for convenience
pub use bookings::booking_handler;
pub use health::{health_handler, liveness_handler};
pub use signup::signup_handler;
