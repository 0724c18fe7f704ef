//! HTTP server for Conductor.
//!
//! Hosts the pipeline coordinator, drives its monitor loop and exposes
//! health, status and trigger endpoints.

pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use state::AppState;
