//! Power supply models and their time-indexed profiles.

/// Stored-energy sources and recharge accounting.
pub mod battery;
/// Time-of-day tables and CSV loading.
pub mod profile;
pub mod source;
/// Seeded solar and wind profile generators.
pub mod synthetic;

// Re-export the main types for convenience
pub use battery::{Battery, RechargeRecord};
pub use profile::{Profile, ProfileTable};
pub use source::{PowerSource, SourceCategory, SourceKind, SourceLocation, SourceNaming};
