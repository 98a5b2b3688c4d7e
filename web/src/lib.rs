//! Axum glue for Campus Events.
//!
//! Everything here is independent of the route table, so the server crate
//! (and its tests) can assemble routers from these pieces:
//!
//! - [`AppError`]: error type rendered as `{ success: false, statusCode, code, message }`,
//!   with `From` impls for registration and store errors
//! - [`ApiResponse`]: the matching success envelope
//! - [`Actor`] and the [`Student`], [`Staff`], [`Admin`] gates: caller identity
//!   from gateway headers
//! - [`correlation_id_layer`]: per-request correlation id and tracing span
//! - [`handlers::health`]: liveness and store readiness
//!
//! # Request Flow
//!
//! 1. Correlation middleware opens the request span
//! 2. Extractors read the actor and apply the route's role gate
//! 3. The handler calls the engine, roster or audit service
//! 4. Results become an [`ApiResponse`], errors an [`AppError`]

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod response;

pub use error::AppError;
pub use extractors::{Actor, Admin, CorrelationId, Staff, Student, USER_ID_HEADER, USER_ROLE_HEADER};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationIdExt, correlation_id_layer};
pub use response::ApiResponse;
