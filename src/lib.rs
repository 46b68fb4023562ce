//! Power distribution and carbon accounting for simulated fog infrastructure.

/// TOML scenario configuration and presets.
pub mod config;
pub mod error;
pub mod id;
/// Nodes, links and the applications placed on them.
pub mod infra;
/// Ledger export.
pub mod io;
pub mod runner;
pub mod scenario;
/// Power domains, distribution, events and the scheduler.
pub mod sim;
pub mod sources;
pub mod telemetry;
