//! HTTP configuration service for woodconf.
//!
//! Serves the CI server's configuration extension endpoint and health checks.

pub mod error;
pub mod routes;
pub mod signature;
pub mod state;
pub mod telemetry;

pub use state::AppState;
