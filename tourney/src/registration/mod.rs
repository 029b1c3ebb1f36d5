//! Player registrations.
//!
//! Capacity counts PENDING, CONFIRMED and CHECKED_IN rows; everything beyond
//! it waits in a FIFO waitlist. Registrations are never deleted.

pub mod manager;
pub mod models;

pub use manager::{Cancellation, CheckInClosure, RegistrationManager};
pub use models::{
    EntryType, NewRegistration, Registration, RegistrationId, RegistrationStatus, seat_assignment,
    sort_by_seed,
};
