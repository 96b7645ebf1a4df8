//! Price scanner service: configuration and the HTTP API
//!
//! Exposed as a library so integration tests can drive the router directly.

pub mod api;
pub mod config;
