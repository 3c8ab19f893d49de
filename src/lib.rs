//! Azure subscription janitor
//!
//! Deletes Azure resources whose TTL tag has expired, trims per-scope
//! deployment histories and removes stale role assignments. Every scan
//! cycle publishes its findings as Prometheus metrics.
//!
//! # Module Structure
//!
//! - [`config`] - CLI flags and environment configuration
//! - [`azure`] - AAD credentials, ARM HTTP client and the typed directory
//! - [`janitor`] - expiry evaluation, api-version catalog and the cleanup engine
//! - [`metrics`] - owned metrics sink with Prometheus text rendering
//! - [`server`] - axum endpoint serving `/metrics` and `/healthz`

pub mod azure;
pub mod config;
pub mod janitor;
pub mod metrics;
pub mod server;

pub use config::Opts;
pub use janitor::{Janitor, JanitorConfig};
pub use metrics::MetricsSink;
