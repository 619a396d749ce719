//! Employee records over SQLite with runtime-extensible columns.
//!
//! The schema of the employee table can grow after deployment: an
//! administrator adds typed columns at runtime, and the service keeps an
//! in-memory cache of dynamic field values consistent with the store while
//! searches merge cached and store-resident data.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod schema;
pub mod service;
pub mod value;

pub use error::{Error, Result};
