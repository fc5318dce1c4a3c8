//! Edge admission-control filter.
//!
//! Every inbound request passes an ordered chain of checks (origin country,
//! client identity, per-client rate limit). Independently, site-wide counters
//! of passed and blocked requests drive a once-per-window attack alert. All
//! shared state lives in an external store, so any number of filter
//! instances can run side by side.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod store;
pub mod utils;
