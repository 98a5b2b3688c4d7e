//! REST handlers, grouped by resource.

pub mod admin;
pub mod events;
pub mod registrations;
pub mod users;
