//! Error type shared by the power engine.

/// Errors raised by the power distribution engine.
///
/// Configuration variants are returned while building sources and domains;
/// the remaining variants are modeling defects detected mid-run. Neither kind
/// is retried: the simulation stops at the first error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PowerError {
    #[error("invalid time of day \"{0}\" (expected HH:MM)")]
    InvalidTimeOfDay(String),
    #[error("start time {start} not present in profile table")]
    MissingStartTime { start: String },
    #[error("profile table is empty")]
    EmptyProfile,
    #[error("profile sampling interval must be > 0")]
    InvalidSampleInterval,
    #[error("profile csv error: {0}")]
    ProfileCsv(String),
    #[error("profile table has {rows} rows every {interval_min} min; it must cover exactly one day")]
    PartialDayProfile { rows: usize, interval_min: u64 },
    #[error("profile row {time} is off the sampling grid (expected {expected})")]
    OffGridSample { time: String, expected: String },

    #[error("power source \"{0}\" already belongs to this domain")]
    DuplicateSource(String),
    #[error("priority slot {priority} is already occupied by \"{occupant}\"")]
    SlotOccupied { priority: usize, occupant: String },
    #[error("domain already has an offsite non-renewable source (\"{existing}\")")]
    MultipleOffsiteNonRenewable { existing: String },
    #[error("power domain \"{0}\" has no power sources")]
    NoSources(String),
    #[error("power domain \"{0}\" has no associated entities")]
    NoEntities(String),
    #[error("unknown power source")]
    UnknownSource,
    #[error("unknown entity")]
    UnknownEntity,
    #[error("unknown application")]
    UnknownApplication,
    #[error("unknown power domain \"{0}\"")]
    UnknownDomain(String),

    #[error("entity \"{entity}\" is already attached to \"{source_name}\"")]
    AlreadyAttached { entity: String, source_name: String },
    #[error("entity \"{entity}\" is not attached to \"{source_name}\"")]
    NotAttached { entity: String, source_name: String },
    #[error("entity \"{0}\" is already registered")]
    DuplicateEntity(String),

    #[error("entity \"{0}\" is already paused")]
    AlreadyPaused(String),
    #[error("entity \"{0}\" is not paused")]
    NotPaused(String),
    #[error("entity \"{entity}\" cannot reserve {requested} (only {available} free)")]
    CapacityExceeded {
        entity: String,
        requested: f64,
        available: f64,
    },

    #[error("battery draw must be non-negative, got {0}")]
    NegativeDraw(f64),
    #[error("battery draw of {requested} exceeds remaining {remaining}")]
    BatteryOverdraw { requested: f64, remaining: f64 },
    #[error("power source \"{0}\" is not a battery")]
    NotABattery(String),

    #[error("insufficient power in domain \"{domain}\": unpowered entities {entities:?}")]
    UnpoweredEntities {
        domain: String,
        entities: Vec<String>,
    },
    #[error("repeat interval \"{0}\" must be positive")]
    InvalidRepeat(String),
    #[error("event \"{event}\" failed: {cause}")]
    EventFailed {
        event: String,
        #[source]
        cause: Box<PowerError>,
    },
}
