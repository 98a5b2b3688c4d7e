//! Campus Events HTTP API.
//!
//! Coordinators publish events, students register for them, and the
//! registration engine keeps `Event.participants` and `User.registeredEvents`
//! in step. This crate holds the configuration, the router and the handlers;
//! the binary in `main.rs` wires them to a store and a listener.

pub mod api;
pub mod config;
pub mod server;

pub use config::{Config, StoreBackend};
pub use server::{AppState, build_router};
