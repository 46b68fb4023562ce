//! TOML-based scenario configuration and preset definitions.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::sources::SourceLocation;
use crate::sources::profile::{MINUTES_PER_DAY, parse_time_of_day};

/// Top-level scenario configuration parsed from TOML.
///
/// Load from TOML with [`ScenarioConfig::from_toml_file`] or start from one
/// of the [`ScenarioConfig::PRESETS`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation timing and global parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Compute nodes.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    /// Network links.
    #[serde(default)]
    pub links: Vec<LinkConfig>,
    /// Applications mapped onto the nodes and links.
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
    /// Power domains.
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
    /// Timed events.
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Minutes per tick (must be > 0).
    pub update_interval_min: u64,
    /// Simulated minutes to run (must be > 0).
    pub duration_min: u64,
    /// Start time of day, `HH:MM`.
    pub start_time: String,
    /// Master random seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            update_interval_min: 5,
            duration_min: 1440,
            start_time: "00:00".to_string(),
            seed: 42,
        }
    }
}

/// A compute node.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub name: String,
    /// Compute capacity (CU).
    pub cu: f64,
    /// Idle draw (W).
    #[serde(default)]
    pub static_w: f64,
    /// Draw at full utilisation (W).
    pub max_w: f64,
}

/// A network link.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    pub name: String,
    pub bandwidth: f64,
    /// Idle draw (W).
    #[serde(default)]
    pub static_w: f64,
    /// Draw per unit of reserved bandwidth (W).
    #[serde(default)]
    pub w_per_unit: f64,
}

/// An application with its task-to-node mapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationConfig {
    pub name: String,
    pub tasks: Vec<TaskConfig>,
    #[serde(default)]
    pub flows: Vec<FlowConfig>,
    /// Place at the start of the run; otherwise only through a `place` event.
    #[serde(default = "default_true")]
    pub autostart: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub name: String,
    #[serde(default)]
    pub cu: f64,
    /// Node the task runs on.
    pub node: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    pub name: String,
    /// Producing task name.
    pub from: String,
    /// Consuming task name.
    pub to: String,
    pub bit_rate: f64,
    /// Links on the route, in order.
    #[serde(default)]
    pub links: Vec<String>,
}

/// A power domain.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainConfig {
    pub name: String,
    /// Distributor: `"priority"`, `"smart"` or `"static"`.
    #[serde(default = "default_distributor")]
    pub distributor: String,
    /// Names of the nodes and links the domain powers.
    pub entities: Vec<String>,
    pub sources: Vec<SourceConfig>,
}

/// Kind of power source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKindConfig {
    Solar,
    Wind,
    Grid,
    Battery,
}

/// A power source inside a domain.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Defaults to `<kind>_<n>`.
    #[serde(default)]
    pub name: Option<String>,
    pub kind: SourceKindConfig,
    /// Defaults to onsite for renewables, offsite for grid, local for batteries.
    #[serde(default)]
    pub location: Option<SourceLocation>,
    /// Priority slot; appended after the previous source when absent.
    #[serde(default)]
    pub priority: Option<usize>,
    /// Capacity profile for solar/wind, intensity profile for grid.
    #[serde(default)]
    pub profile: Option<ProfileConfig>,
    /// Battery capacity.
    #[serde(default)]
    pub capacity: f64,
    /// Initial battery charge; full when absent.
    #[serde(default)]
    pub charge: Option<f64>,
    /// Battery energy restored per tick while recharging.
    #[serde(default)]
    pub recharge_rate: f64,
    /// Entities pinned to this source under the static distributor.
    #[serde(default)]
    pub pin: Vec<String>,
}

/// Where a time-indexed profile comes from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProfileConfig {
    /// The same reading all day.
    Constant { value: f64 },
    /// Inline `[["HH:MM", value], ...]` rows.
    Table {
        interval_min: u64,
        rows: Vec<(String, f64)>,
    },
    /// CSV file with `time,value` rows.
    Csv { path: PathBuf, interval_min: u64 },
    /// Seeded half-sine daylight curve.
    Solar {
        peak_w: f64,
        #[serde(default = "default_sunrise")]
        sunrise: String,
        #[serde(default = "default_sunset")]
        sunset: String,
        #[serde(default)]
        noise_std: f64,
        interval_min: u64,
    },
    /// Seeded AR(1) gusts around a mean.
    Wind {
        mean_w: f64,
        #[serde(default = "default_alpha")]
        alpha: f64,
        #[serde(default)]
        gust_std: f64,
        interval_min: u64,
    },
}

/// A timed event.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventConfig {
    /// Defaults to the action type.
    #[serde(default)]
    pub name: Option<String>,
    /// First firing, `HH:MM` on or after the start time.
    pub at: String,
    /// Repeat every `k` ticks.
    #[serde(default)]
    pub repeat_ticks: Option<u64>,
    /// Repeat every `HH:MM` of simulated time.
    #[serde(default)]
    pub repeat_every: Option<String>,
    pub action: ActionConfig,
}

/// What an event does.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    RemoveSource {
        domain: String,
        source: String,
    },
    AddSource {
        domain: String,
        source: SourceConfig,
    },
    /// Recharge `battery` from `from`; with `pause_consumers` the battery's
    /// entities are paused for the duration of the recharge.
    RechargeBattery {
        domain: String,
        battery: String,
        from: String,
        #[serde(default)]
        pause_consumers: bool,
    },
    Pause {
        entity: String,
    },
    Unpause {
        entity: String,
    },
    Place {
        application: String,
    },
    Deallocate {
        application: String,
    },
}

impl ActionConfig {
    /// Action type as written in TOML.
    pub fn label(&self) -> &'static str {
        match self {
            ActionConfig::RemoveSource { .. } => "remove_source",
            ActionConfig::AddSource { .. } => "add_source",
            ActionConfig::RechargeBattery { .. } => "recharge_battery",
            ActionConfig::Pause { .. } => "pause",
            ActionConfig::Unpause { .. } => "unpause",
            ActionConfig::Place { .. } => "place",
            ActionConfig::Deallocate { .. } => "deallocate",
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_distributor() -> String {
    "priority".to_string()
}

fn default_sunrise() -> String {
    "06:00".to_string()
}

fn default_sunset() -> String {
    "18:00".to_string()
}

fn default_alpha() -> f64 {
    0.8
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"domains[0].sources[1].profile"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

const DISTRIBUTORS: &[&str] = &["priority", "smart", "static"];

impl ScenarioConfig {
    /// A fog pipeline: sensor and fog node on solar backed by the grid,
    /// cloud on its own grid connection.
    pub fn fog_baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            nodes: vec![
                node("sensor", 10.0, 2.0, 4.0),
                node("fog", 100.0, 20.0, 60.0),
                node("cloud", 10_000.0, 200.0, 1_000.0),
            ],
            links: vec![link("wifi", 1_000.0, 1.0, 0.01), link("wan", 10_000.0, 5.0, 0.005)],
            applications: vec![pipeline()],
            domains: vec![
                DomainConfig {
                    name: "edge".to_string(),
                    distributor: "priority".to_string(),
                    entities: names(&["sensor", "fog", "wifi"]),
                    sources: vec![
                        source(SourceKindConfig::Solar, "solar", Some(solar_curve(80.0))),
                        source(SourceKindConfig::Grid, "grid", Some(grid_intensity())),
                    ],
                },
                DomainConfig {
                    name: "cloud".to_string(),
                    distributor: "priority".to_string(),
                    entities: names(&["cloud", "wan"]),
                    sources: vec![source(
                        SourceKindConfig::Grid,
                        "cloud_grid",
                        Some(ProfileConfig::Constant { value: 350.0 }),
                    )],
                },
            ],
            events: Vec::new(),
        }
    }

    /// The baseline from noon with wind added, smart distribution, and an
    /// evening solar outage that is repaired the next morning.
    pub fn solar_smart() -> Self {
        let mut cfg = Self::fog_baseline();
        cfg.simulation.start_time = "12:00".to_string();
        let edge = &mut cfg.domains[0];
        edge.distributor = "smart".to_string();
        edge.sources.insert(
            1,
            source(
                SourceKindConfig::Wind,
                "wind",
                Some(ProfileConfig::Wind {
                    mean_w: 30.0,
                    alpha: 0.9,
                    gust_std: 0.3,
                    interval_min: 15,
                }),
            ),
        );
        cfg.events = vec![
            EventConfig {
                name: Some("solar_outage".to_string()),
                at: "19:00".to_string(),
                repeat_ticks: None,
                repeat_every: None,
                action: ActionConfig::RemoveSource {
                    domain: "edge".to_string(),
                    source: "solar".to_string(),
                },
            },
            EventConfig {
                name: Some("solar_repair".to_string()),
                at: "05:00".to_string(),
                repeat_ticks: None,
                repeat_every: None,
                action: ActionConfig::AddSource {
                    domain: "edge".to_string(),
                    source: SourceConfig {
                        priority: Some(0),
                        ..source(SourceKindConfig::Solar, "solar", Some(solar_curve(80.0)))
                    },
                },
            },
        ];
        cfg
    }

    /// Static distribution: the edge runs from a battery recharged from the
    /// grid every six hours, its consumers paused while it charges.
    pub fn static_battery() -> Self {
        let mut cfg = Self::fog_baseline();
        cfg.domains[0] = DomainConfig {
            name: "edge".to_string(),
            distributor: "static".to_string(),
            entities: names(&["sensor", "fog", "wifi"]),
            sources: vec![
                SourceConfig {
                    capacity: 3_000.0,
                    recharge_rate: 500.0,
                    pin: names(&["sensor", "fog", "wifi"]),
                    ..source(SourceKindConfig::Battery, "battery", None)
                },
                source(SourceKindConfig::Grid, "grid", Some(grid_intensity())),
            ],
        };
        cfg.events = vec![EventConfig {
            name: Some("recharge".to_string()),
            at: "06:00".to_string(),
            repeat_ticks: None,
            repeat_every: Some("06:00".to_string()),
            action: ActionConfig::RechargeBattery {
                domain: "edge".to_string(),
                battery: "battery".to_string(),
                from: "grid".to_string(),
                pause_consumers: true,
            },
        }];
        cfg
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["fog_baseline", "solar_smart", "static_battery"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "fog_baseline" => Ok(Self::fog_baseline()),
            "solar_smart" => Ok(Self::solar_smart()),
            "static_battery" => Ok(Self::static_battery()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.update_interval_min == 0 {
            errors.push(ConfigError::new("simulation.update_interval_min", "must be > 0"));
        }
        if s.duration_min == 0 {
            errors.push(ConfigError::new("simulation.duration_min", "must be > 0"));
        }
        if parse_time_of_day(&s.start_time).is_err() {
            errors.push(ConfigError::new("simulation.start_time", "must be HH:MM"));
        }

        let mut entity_names = HashSet::new();
        let mut node_names = HashSet::new();
        let mut link_names = HashSet::new();
        for (i, n) in self.nodes.iter().enumerate() {
            if !entity_names.insert(n.name.as_str()) {
                errors.push(ConfigError::new(format!("nodes[{i}].name"), "duplicate entity name"));
            }
            node_names.insert(n.name.as_str());
            if n.cu < 0.0 || n.static_w < 0.0 || n.max_w < n.static_w {
                errors.push(ConfigError::new(
                    format!("nodes[{i}]"),
                    "need cu >= 0 and 0 <= static_w <= max_w",
                ));
            }
        }
        for (i, l) in self.links.iter().enumerate() {
            if !entity_names.insert(l.name.as_str()) {
                errors.push(ConfigError::new(format!("links[{i}].name"), "duplicate entity name"));
            }
            link_names.insert(l.name.as_str());
            if l.bandwidth < 0.0 || l.static_w < 0.0 || l.w_per_unit < 0.0 {
                errors.push(ConfigError::new(format!("links[{i}]"), "must be non-negative"));
            }
        }

        let mut app_names = HashSet::new();
        for (i, app) in self.applications.iter().enumerate() {
            if !app_names.insert(app.name.as_str()) {
                errors.push(ConfigError::new(
                    format!("applications[{i}].name"),
                    "duplicate application name",
                ));
            }
            for (j, t) in app.tasks.iter().enumerate() {
                if !node_names.contains(t.node.as_str()) {
                    errors.push(ConfigError::new(
                        format!("applications[{i}].tasks[{j}].node"),
                        format!("unknown node \"{}\"", t.node),
                    ));
                }
            }
            for (j, f) in app.flows.iter().enumerate() {
                let field = format!("applications[{i}].flows[{j}]");
                for task in [&f.from, &f.to] {
                    if !app.tasks.iter().any(|t| t.name == *task) {
                        errors.push(ConfigError::new(&field, format!("unknown task \"{task}\"")));
                    }
                }
                for l in &f.links {
                    if !link_names.contains(l.as_str()) {
                        errors.push(ConfigError::new(&field, format!("unknown link \"{l}\"")));
                    }
                }
            }
        }

        let mut domain_names = HashSet::new();
        let mut claimed = HashSet::new();
        for (i, d) in self.domains.iter().enumerate() {
            let field = format!("domains[{i}]");
            if !domain_names.insert(d.name.as_str()) {
                errors.push(ConfigError::new(format!("{field}.name"), "duplicate domain name"));
            }
            if !DISTRIBUTORS.contains(&d.distributor.as_str()) {
                errors.push(ConfigError::new(
                    format!("{field}.distributor"),
                    format!(
                        "must be one of {}, got \"{}\"",
                        DISTRIBUTORS.join(", "),
                        d.distributor
                    ),
                ));
            }
            if d.entities.is_empty() {
                errors.push(ConfigError::new(format!("{field}.entities"), "must not be empty"));
            }
            if d.sources.is_empty() {
                errors.push(ConfigError::new(format!("{field}.sources"), "must not be empty"));
            }
            for e in &d.entities {
                if !entity_names.contains(e.as_str()) {
                    errors.push(ConfigError::new(
                        format!("{field}.entities"),
                        format!("unknown entity \"{e}\""),
                    ));
                } else if !claimed.insert(e.as_str()) {
                    errors.push(ConfigError::new(
                        format!("{field}.entities"),
                        format!("entity \"{e}\" belongs to more than one domain"),
                    ));
                }
            }
            for (j, src) in d.sources.iter().enumerate() {
                validate_source(&format!("{field}.sources[{j}]"), src, &mut errors);
                for p in &src.pin {
                    if d.distributor != "static" {
                        errors.push(ConfigError::new(
                            format!("{field}.sources[{j}].pin"),
                            "pins need the static distributor",
                        ));
                        break;
                    }
                    if !d.entities.contains(p) {
                        errors.push(ConfigError::new(
                            format!("{field}.sources[{j}].pin"),
                            format!("\"{p}\" is not an entity of this domain"),
                        ));
                    }
                }
            }
            if d.distributor == "static" {
                for e in &d.entities {
                    let pins = d.sources.iter().filter(|src| src.pin.contains(e)).count();
                    if pins != 1 {
                        errors.push(ConfigError::new(
                            format!("{field}.entities"),
                            format!("\"{e}\" must be pinned to exactly one source, found {pins}"),
                        ));
                    }
                }
            }
        }

        for (i, ev) in self.events.iter().enumerate() {
            let field = format!("events[{i}]");
            if parse_time_of_day(&ev.at).is_err() {
                errors.push(ConfigError::new(format!("{field}.at"), "must be HH:MM"));
            }
            if ev.repeat_ticks.is_some() && ev.repeat_every.is_some() {
                errors.push(ConfigError::new(
                    format!("{field}.repeat_ticks"),
                    "set at most one of repeat_ticks and repeat_every",
                ));
            }
            if ev.repeat_ticks == Some(0) {
                errors.push(ConfigError::new(format!("{field}.repeat_ticks"), "must be > 0"));
            }
            if let Some(every) = &ev.repeat_every {
                if !matches!(parse_time_of_day(every), Ok(m) if m > 0) {
                    errors.push(ConfigError::new(
                        format!("{field}.repeat_every"),
                        "must be a positive HH:MM",
                    ));
                }
            }

            let action = format!("{field}.action");
            match &ev.action {
                ActionConfig::RemoveSource { domain, .. }
                | ActionConfig::RechargeBattery { domain, .. } => {
                    if !domain_names.contains(domain.as_str()) {
                        errors.push(ConfigError::new(&action, format!("unknown domain \"{domain}\"")));
                    }
                }
                ActionConfig::AddSource { domain, source } => {
                    if !domain_names.contains(domain.as_str()) {
                        errors.push(ConfigError::new(&action, format!("unknown domain \"{domain}\"")));
                    }
                    validate_source(&format!("{action}.source"), source, &mut errors);
                }
                ActionConfig::Pause { entity } | ActionConfig::Unpause { entity } => {
                    if !entity_names.contains(entity.as_str()) {
                        errors.push(ConfigError::new(&action, format!("unknown entity \"{entity}\"")));
                    }
                }
                ActionConfig::Place { application } | ActionConfig::Deallocate { application } => {
                    if !app_names.contains(application.as_str()) {
                        errors.push(ConfigError::new(
                            &action,
                            format!("unknown application \"{application}\""),
                        ));
                    }
                }
            }
        }

        errors
    }
}

fn validate_source(field: &str, src: &SourceConfig, errors: &mut Vec<ConfigError>) {
    match src.kind {
        SourceKindConfig::Battery => {
            if src.capacity <= 0.0 {
                errors.push(ConfigError::new(format!("{field}.capacity"), "must be > 0"));
            }
            if src.recharge_rate <= 0.0 {
                errors.push(ConfigError::new(format!("{field}.recharge_rate"), "must be > 0"));
            }
            if src.charge.is_some_and(|c| c < 0.0 || c > src.capacity) {
                errors.push(ConfigError::new(
                    format!("{field}.charge"),
                    "must be in [0, capacity]",
                ));
            }
        }
        _ if src.profile.is_none() => {
            errors.push(ConfigError::new(
                format!("{field}.profile"),
                "required for solar, wind and grid sources",
            ));
        }
        _ => {}
    }

    let Some(profile) = &src.profile else {
        return;
    };
    let interval = match profile {
        ProfileConfig::Constant { .. } => None,
        ProfileConfig::Table { interval_min, rows } => {
            if rows.is_empty() {
                errors.push(ConfigError::new(format!("{field}.profile.rows"), "must not be empty"));
            }
            if let Some((t, _)) = rows.iter().find(|(t, _)| parse_time_of_day(t).is_err()) {
                errors.push(ConfigError::new(
                    format!("{field}.profile.rows"),
                    format!("\"{t}\" is not HH:MM"),
                ));
            } else if !rows.is_empty() && rows.len() as u64 * *interval_min != MINUTES_PER_DAY {
                errors.push(ConfigError::new(
                    format!("{field}.profile.rows"),
                    format!(
                        "{} rows every {interval_min} min do not cover one day",
                        rows.len()
                    ),
                ));
            }
            Some(*interval_min)
        }
        ProfileConfig::Csv { interval_min, .. } | ProfileConfig::Wind { interval_min, .. } => {
            Some(*interval_min)
        }
        ProfileConfig::Solar {
            sunrise,
            sunset,
            interval_min,
            ..
        } => {
            match (parse_time_of_day(sunrise), parse_time_of_day(sunset)) {
                (Ok(rise), Ok(set)) if rise < set => {}
                _ => errors.push(ConfigError::new(
                    format!("{field}.profile.sunrise"),
                    "sunrise and sunset must be HH:MM with sunrise < sunset",
                )),
            }
            Some(*interval_min)
        }
    };
    match interval {
        Some(0) => {
            errors.push(ConfigError::new(format!("{field}.profile.interval_min"), "must be > 0"));
        }
        Some(i) if MINUTES_PER_DAY % i != 0 => {
            errors.push(ConfigError::new(
                format!("{field}.profile.interval_min"),
                "must divide a day (1440 min)",
            ));
        }
        _ => {}
    }
}

fn node(name: &str, cu: f64, static_w: f64, max_w: f64) -> NodeConfig {
    NodeConfig {
        name: name.to_string(),
        cu,
        static_w,
        max_w,
    }
}

fn link(name: &str, bandwidth: f64, static_w: f64, w_per_unit: f64) -> LinkConfig {
    LinkConfig {
        name: name.to_string(),
        bandwidth,
        static_w,
        w_per_unit,
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn source(kind: SourceKindConfig, name: &str, profile: Option<ProfileConfig>) -> SourceConfig {
    SourceConfig {
        name: Some(name.to_string()),
        kind,
        location: None,
        priority: None,
        profile,
        capacity: 0.0,
        charge: None,
        recharge_rate: 0.0,
        pin: Vec::new(),
    }
}

fn solar_curve(peak_w: f64) -> ProfileConfig {
    ProfileConfig::Solar {
        peak_w,
        sunrise: default_sunrise(),
        sunset: default_sunset(),
        noise_std: 0.05,
        interval_min: 15,
    }
}

/// A day of grid intensity: cleaner overnight, dirtier at the evening peak.
fn grid_intensity() -> ProfileConfig {
    let rows = [
        ("00:00", 180.0),
        ("04:00", 160.0),
        ("08:00", 260.0),
        ("12:00", 220.0),
        ("16:00", 300.0),
        ("20:00", 240.0),
    ];
    ProfileConfig::Table {
        interval_min: 240,
        rows: rows.iter().map(|&(t, v)| (t.to_string(), v)).collect(),
    }
}

fn pipeline() -> ApplicationConfig {
    ApplicationConfig {
        name: "video_analytics".to_string(),
        tasks: vec![
            TaskConfig {
                name: "capture".to_string(),
                cu: 2.0,
                node: "sensor".to_string(),
            },
            TaskConfig {
                name: "detect".to_string(),
                cu: 40.0,
                node: "fog".to_string(),
            },
            TaskConfig {
                name: "archive".to_string(),
                cu: 500.0,
                node: "cloud".to_string(),
            },
        ],
        flows: vec![
            FlowConfig {
                name: "frames".to_string(),
                from: "capture".to_string(),
                to: "detect".to_string(),
                bit_rate: 400.0,
                links: names(&["wifi"]),
            },
            FlowConfig {
                name: "detections".to_string(),
                from: "detect".to_string(),
                to: "archive".to_string(),
                bit_rate: 50.0,
                links: names(&["wan"]),
            },
        ],
        autostart: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_preset_valid() {
        let cfg = ScenarioConfig::fog_baseline();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "baseline should be valid: {errors:?}");
    }

    #[test]
    fn from_preset_unknown() {
        let err = ScenarioConfig::from_preset("nonexistent");
        assert!(err.as_ref().is_err_and(|e| e.message.contains("unknown preset")));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[simulation]
update_interval_min = 1
duration_min = 60
start_time = "08:00"
seed = 7

[[nodes]]
name = "fog"
cu = 100.0
static_w = 20.0
max_w = 60.0

[[links]]
name = "wifi"
bandwidth = 1000.0
w_per_unit = 0.01

[[applications]]
name = "app"
tasks = [{ name = "t", cu = 10.0, node = "fog" }]

[[domains]]
name = "edge"
distributor = "smart"
entities = ["fog", "wifi"]

[[domains.sources]]
kind = "solar"
profile = { type = "table", interval_min = 720, rows = [["08:00", 50.0], ["20:00", 80.0]] }

[[domains.sources]]
kind = "grid"
profile = { type = "constant", value = 250.0 }

[[domains.sources]]
kind = "battery"
priority = 5
capacity = 100.0
recharge_rate = 10.0

[[events]]
at = "08:30"
repeat_ticks = 10
action = { type = "recharge_battery", domain = "edge", battery = "battery_2", from = "grid_1" }
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.unwrap_or_default();
        assert_eq!(cfg.simulation.update_interval_min, 1);
        assert_eq!(cfg.domains[0].sources.len(), 3);
        assert_eq!(cfg.domains[0].sources[2].priority, Some(5));
        assert_eq!(cfg.events[0].action.label(), "recharge_battery");
        assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[simulation]
update_interval_min = 5
bogus_field = true
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = ScenarioConfig::from_toml_str("[simulation]\nseed = 99\n").unwrap_or_default();
        assert_eq!(cfg.simulation.seed, 99);
        assert_eq!(cfg.simulation.update_interval_min, 5);
        assert_eq!(cfg.simulation.start_time, "00:00");
    }

    #[test]
    fn validation_catches_zero_interval_and_bad_start() {
        let mut cfg = ScenarioConfig::fog_baseline();
        cfg.simulation.update_interval_min = 0;
        cfg.simulation.start_time = "25:00".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "simulation.update_interval_min"));
        assert!(errors.iter().any(|e| e.field == "simulation.start_time"));
    }

    #[test]
    fn validation_catches_bad_distributor() {
        let mut cfg = ScenarioConfig::fog_baseline();
        cfg.domains[0].distributor = "greedy".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "domains[0].distributor"));
    }

    #[test]
    fn validation_catches_unknown_and_shared_entities() {
        let mut cfg = ScenarioConfig::fog_baseline();
        cfg.domains[0].entities.push("ghost".to_string());
        cfg.domains[1].entities.push("fog".to_string());
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.message.contains("unknown entity")));
        assert!(errors.iter().any(|e| e.message.contains("more than one domain")));
    }

    #[test]
    fn validation_requires_profiles_and_battery_parameters() {
        let mut cfg = ScenarioConfig::fog_baseline();
        cfg.domains[0].sources[0].profile = None;
        cfg.domains[1].sources.push(source(SourceKindConfig::Battery, "b", None));
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "domains[0].sources[0].profile"));
        assert!(errors.iter().any(|e| e.field == "domains[1].sources[1].capacity"));
        assert!(errors.iter().any(|e| e.field == "domains[1].sources[1].recharge_rate"));
    }

    #[test]
    fn validation_rejects_pins_without_static_distributor() {
        let mut cfg = ScenarioConfig::fog_baseline();
        cfg.domains[0].sources[0].pin = names(&["fog"]);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "domains[0].sources[0].pin"));
    }

    #[test]
    fn static_domains_need_every_entity_pinned_once() {
        let mut cfg = ScenarioConfig::static_battery();
        cfg.domains[0].sources[0].pin.retain(|e| e != "wifi");
        let errors = cfg.validate();
        assert!(
            errors
                .iter()
                .any(|e| e.field == "domains[0].entities" && e.message.contains("\"wifi\"")),
            "{errors:?}"
        );

        let mut cfg = ScenarioConfig::static_battery();
        cfg.domains[0].sources[1].pin = names(&["fog"]);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.message.contains("found 2")), "{errors:?}");
    }

    #[test]
    fn validation_reports_partial_day_tables() {
        let mut cfg = ScenarioConfig::fog_baseline();
        cfg.domains[0].sources[1].profile = Some(ProfileConfig::Table {
            interval_min: 60,
            rows: vec![("00:00".to_string(), 100.0), ("01:00".to_string(), 120.0)],
        });
        cfg.domains[1].sources[0].profile = Some(ProfileConfig::Wind {
            mean_w: 10.0,
            alpha: 0.8,
            gust_std: 0.1,
            interval_min: 7,
        });
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "domains[0].sources[1].profile.rows"));
        assert!(errors.iter().any(|e| e.field == "domains[1].sources[0].profile.interval_min"));
    }

    #[test]
    fn validation_checks_event_references() {
        let mut cfg = ScenarioConfig::fog_baseline();
        cfg.events.push(EventConfig {
            name: None,
            at: "noon".to_string(),
            repeat_ticks: Some(0),
            repeat_every: None,
            action: ActionConfig::Deallocate {
                application: "nope".to_string(),
            },
        });
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "events[0].at"));
        assert!(errors.iter().any(|e| e.field == "events[0].repeat_ticks"));
        assert!(errors.iter().any(|e| e.message.contains("unknown application")));
    }

    #[test]
    fn static_battery_pins_every_edge_entity() {
        let cfg = ScenarioConfig::static_battery();
        let edge = &cfg.domains[0];
        assert_eq!(edge.distributor, "static");
        assert_eq!(edge.sources[0].pin, edge.entities);
    }
}
