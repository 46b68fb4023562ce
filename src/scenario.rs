//! Turns a [`ScenarioConfig`] into a ready-to-run [`Simulation`].

use std::collections::HashMap;

use tracing::info;

use crate::config::{
    ActionConfig, ApplicationConfig, ConfigError, DomainConfig, EventConfig, ProfileConfig,
    ScenarioConfig, SourceConfig, SourceKindConfig,
};
use crate::error::PowerError;
use crate::id::EntityId;
use crate::infra::{Application, Infrastructure, PowerEntity};
use crate::sim::event::EventAction;
use crate::sim::{
    Distributor, Event, EventDomain, PowerDomain, PriorityDistributor, Repeat, SimConfig,
    Simulation, StaticDistributor,
};
use crate::sources::profile::parse_time_of_day;
use crate::sources::synthetic::{solar_profile, wind_profile};
use crate::sources::{Battery, PowerSource, Profile, ProfileTable, SourceNaming};

/// Why a scenario could not be built.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("invalid scenario: {}", summary(.0))]
    Config(Vec<ConfigError>),
    #[error(transparent)]
    Power(#[from] PowerError),
}

fn summary(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Builds the infrastructure, power domains and events of a scenario.
///
/// Autostart applications are placed before the first tick. Synthetic
/// profiles draw from `simulation.seed`, offset per source so two sources
/// never share noise.
///
/// # Errors
///
/// Returns `ScenarioError::Config` if validation fails and
/// `ScenarioError::Power` if the model rejects the configuration (an
/// over-committed node, two grids in one domain, a bad profile table).
pub fn build_simulation(config: &ScenarioConfig) -> Result<Simulation, ScenarioError> {
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ScenarioError::Config(errors));
    }

    let s = &config.simulation;
    let sim_config = SimConfig::new(s.update_interval_min, s.duration_min, s.seed)
        .starting_at(&s.start_time)?;

    let mut infra = Infrastructure::new();
    for n in &config.nodes {
        infra.add_entity(PowerEntity::node(&n.name, n.cu, n.static_w, n.max_w))?;
    }
    for l in &config.links {
        infra.add_entity(PowerEntity::link(&l.name, l.bandwidth, l.static_w, l.w_per_unit))?;
    }
    for app in config.applications.iter().filter(|a| a.autostart) {
        let app = application(app, &infra)?;
        infra.place(app)?;
    }

    let mut factory = SourceFactory::new(&sim_config);
    let mut domains = Vec::with_capacity(config.domains.len());
    for d in &config.domains {
        domains.push(power_domain(d, &sim_config, &mut factory, &mut infra)?);
    }

    let mut events = EventDomain::new("events", &sim_config);
    let apps: HashMap<&str, &ApplicationConfig> = config
        .applications
        .iter()
        .map(|a| (a.name.as_str(), a))
        .collect();
    for ev in &config.events {
        events.add(event(ev, &apps, &mut factory)?);
    }

    let mut sim = Simulation::new(sim_config, infra);
    for domain in domains {
        sim.add_power_domain(domain);
    }
    sim.add_event_domain(events);
    info!(
        domains = config.domains.len(),
        events = config.events.len(),
        start = %sim.config().start_time(),
        "scenario built"
    );
    Ok(sim)
}

fn entity_id(infra: &Infrastructure, name: &str) -> Result<EntityId, PowerError> {
    infra.id_of(name).ok_or(PowerError::UnknownEntity)
}

/// Resolves an application's node and link names against the registry.
fn application(cfg: &ApplicationConfig, infra: &Infrastructure) -> Result<Application, PowerError> {
    let mut app = Application::new(&cfg.name);
    for t in &cfg.tasks {
        app = app.with_task(&t.name, t.cu, entity_id(infra, &t.node)?);
    }
    let task_index = |name: &str| {
        cfg.tasks
            .iter()
            .position(|t| t.name == name)
            .ok_or(PowerError::UnknownApplication)
    };
    for f in &cfg.flows {
        let links = f
            .links
            .iter()
            .map(|l| entity_id(infra, l))
            .collect::<Result<Vec<_>, _>>()?;
        app = app.with_flow(&f.name, task_index(&f.from)?, task_index(&f.to)?, f.bit_rate, links);
    }
    Ok(app)
}

fn distributor(kind: &str) -> Box<dyn Distributor> {
    match kind {
        "smart" => Box::new(PriorityDistributor::smart()),
        "static" => Box::new(StaticDistributor::new()),
        _ => Box::new(PriorityDistributor::new()),
    }
}

fn power_domain(
    cfg: &DomainConfig,
    sim: &SimConfig,
    factory: &mut SourceFactory,
    infra: &mut Infrastructure,
) -> Result<PowerDomain, PowerError> {
    let entities = cfg
        .entities
        .iter()
        .map(|e| entity_id(infra, e))
        .collect::<Result<Vec<_>, _>>()?;

    let mut builder = PowerDomain::builder(&cfg.name, sim)
        .entities(entities)
        .boxed_distributor(distributor(&cfg.distributor));
    let mut pins = Vec::new();
    for src in &cfg.sources {
        let source = factory.build(src)?;
        for p in &src.pin {
            pins.push((entity_id(infra, p)?, source.name.clone()));
        }
        builder = match src.priority {
            Some(p) => builder.source_at(source, p),
            None => builder.source(source),
        };
    }

    let mut domain = builder.build(infra)?;
    for (entity, source) in pins {
        let id = domain.source_id(&source).ok_or(PowerError::UnknownSource)?;
        domain.pin(entity, id, infra)?;
    }
    Ok(domain)
}

/// Builds power sources, naming unnamed ones and seeding synthetic profiles.
struct SourceFactory {
    naming: SourceNaming,
    start_time: String,
    start_min: u64,
    seed: u64,
    built: u64,
}

impl SourceFactory {
    fn new(sim: &SimConfig) -> Self {
        Self {
            naming: SourceNaming::new(),
            start_time: sim.start_time(),
            start_min: sim.start_min,
            seed: sim.seed,
            built: 0,
        }
    }

    fn build(&mut self, cfg: &SourceConfig) -> Result<PowerSource, PowerError> {
        self.built += 1;
        let seed = self.seed.wrapping_add(self.built);
        let mut source = match cfg.kind {
            SourceKindConfig::Solar => PowerSource::solar("", self.profile(cfg, seed)?),
            SourceKindConfig::Wind => PowerSource::wind("", self.profile(cfg, seed)?),
            SourceKindConfig::Grid => PowerSource::grid("", self.profile(cfg, seed)?),
            SourceKindConfig::Battery => {
                let charge = cfg.charge.unwrap_or(cfg.capacity);
                PowerSource::battery("", Battery::new(cfg.capacity, charge, cfg.recharge_rate))
            }
        };
        source.name = match &cfg.name {
            Some(name) => name.clone(),
            None => self.naming.next_name(&source.kind),
        };
        if let Some(location) = cfg.location {
            source = source.at(location);
        }
        Ok(source)
    }

    fn profile(&self, cfg: &SourceConfig, seed: u64) -> Result<Profile, PowerError> {
        let Some(profile) = &cfg.profile else {
            return Err(PowerError::EmptyProfile);
        };
        let table = match profile {
            ProfileConfig::Constant { value } => return Ok(Profile::Constant(*value)),
            ProfileConfig::Table { interval_min, rows } => ProfileTable::from_pairs(
                rows.iter().map(|(t, v)| (t.as_str(), *v)),
                *interval_min,
                &self.start_time,
            )?,
            ProfileConfig::Csv { path, interval_min } => {
                ProfileTable::from_csv_path(path, *interval_min, &self.start_time)?
            }
            ProfileConfig::Solar {
                peak_w,
                sunrise,
                sunset,
                noise_std,
                interval_min,
            } => solar_profile(
                *peak_w,
                parse_time_of_day(sunrise)?,
                parse_time_of_day(sunset)?,
                *noise_std,
                *interval_min,
                self.start_min,
                seed,
            )?,
            ProfileConfig::Wind {
                mean_w,
                alpha,
                gust_std,
                interval_min,
            } => wind_profile(*mean_w, *alpha, *gust_std, *interval_min, seed)?,
        };
        Ok(Profile::Table(table))
    }
}

fn event(
    cfg: &EventConfig,
    apps: &HashMap<&str, &ApplicationConfig>,
    factory: &mut SourceFactory,
) -> Result<Event, PowerError> {
    let name = cfg
        .name
        .clone()
        .unwrap_or_else(|| cfg.action.label().to_string());
    let action = action(&name, &cfg.action, apps, factory)?;
    let event = Event::at_time(name, &cfg.at, action)?;
    match (cfg.repeat_ticks, &cfg.repeat_every) {
        (Some(k), _) => event.repeat(Repeat::Ticks(k)),
        (None, Some(every)) => event.repeat(Repeat::Every(every.clone())),
        (None, None) => Ok(event),
    }
}

fn action(
    name: &str,
    cfg: &ActionConfig,
    apps: &HashMap<&str, &ApplicationConfig>,
    factory: &mut SourceFactory,
) -> Result<EventAction, PowerError> {
    let action: EventAction = match cfg.clone() {
        ActionConfig::RemoveSource { domain, source } => Box::new(move |ctx| {
            let (d, infra) = ctx.world.domain_mut(&domain)?;
            let id = d.source_id(&source).ok_or(PowerError::UnknownSource)?;
            d.remove_source(id, infra)?;
            Ok(())
        }),
        ActionConfig::AddSource { domain, source } => {
            let priority = source.priority;
            let source = factory.build(&source)?;
            Box::new(move |ctx| {
                let (d, _) = ctx.world.domain_mut(&domain)?;
                d.add_source(source.clone(), priority)?;
                Ok(())
            })
        }
        ActionConfig::RechargeBattery {
            domain,
            battery,
            from,
            pause_consumers,
        } => {
            let resume_name = format!("{name}:resume");
            Box::new(move |ctx| {
                let now = ctx.now();
                let (d, infra) = ctx.world.domain_mut(&domain)?;
                let battery_id = d.source_id(&battery).ok_or(PowerError::UnknownSource)?;
                let from_id = d.source_id(&from).ok_or(PowerError::UnknownSource)?;
                let ticks = d.recharge_battery(battery_id, from_id)?;
                if !pause_consumers || ticks == 0 {
                    return Ok(());
                }

                let consumers: Vec<EntityId> = d
                    .source(battery_id)
                    .map(|s| s.entities().collect())
                    .unwrap_or_default();
                let mut parked = Vec::new();
                for entity in consumers {
                    if !infra.get(entity)?.is_paused() {
                        infra.pause(entity)?;
                        parked.push(entity);
                    }
                }
                let resume_at = now + ticks * d.tick_min();
                if !parked.is_empty() {
                    ctx.schedule(Event::at(resume_name.clone(), resume_at, move |ctx| {
                        let infra = &mut ctx.world.infrastructure;
                        for &entity in &parked {
                            if infra.get(entity)?.is_paused() {
                                infra.unpause(entity)?;
                            }
                        }
                        Ok(())
                    }));
                }
                Ok(())
            })
        }
        ActionConfig::Pause { entity } => Box::new(move |ctx| {
            let infra = &mut ctx.world.infrastructure;
            let id = entity_id(infra, &entity)?;
            infra.pause(id)?;
            Ok(())
        }),
        ActionConfig::Unpause { entity } => Box::new(move |ctx| {
            let infra = &mut ctx.world.infrastructure;
            let id = entity_id(infra, &entity)?;
            infra.unpause(id)?;
            Ok(())
        }),
        ActionConfig::Place { application: app } => {
            let app = apps
                .get(app.as_str())
                .map(|a| (*a).clone())
                .ok_or(PowerError::UnknownApplication)?;
            Box::new(move |ctx| {
                let infra = &mut ctx.world.infrastructure;
                let placed = application(&app, infra)?;
                infra.place(placed)?;
                Ok(())
            })
        }
        ActionConfig::Deallocate { application } => Box::new(move |ctx| {
            let infra = &mut ctx.world.infrastructure;
            let id = infra
                .application_id(&application)
                .ok_or(PowerError::UnknownApplication)?;
            infra.deallocate(id)?;
            Ok(())
        }),
    };
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_builds() {
        for name in ScenarioConfig::PRESETS {
            let Ok(cfg) = ScenarioConfig::from_preset(name) else {
                panic!("preset {name} should load");
            };
            let sim = build_simulation(&cfg);
            assert!(sim.is_ok(), "preset {name} should build: {:?}", sim.err());
        }
    }

    #[test]
    fn invalid_config_is_reported_not_built() {
        let mut cfg = ScenarioConfig::fog_baseline();
        cfg.simulation.duration_min = 0;
        let err = build_simulation(&cfg).err();
        assert!(matches!(err, Some(ScenarioError::Config(ref e)) if e.len() == 1));
    }

    #[test]
    fn overcommitted_node_is_a_power_error() {
        let mut cfg = ScenarioConfig::fog_baseline();
        cfg.applications[0].tasks[1].cu = 1_000.0;
        let err = build_simulation(&cfg).err();
        assert!(matches!(
            err,
            Some(ScenarioError::Power(PowerError::CapacityExceeded { .. }))
        ));
    }

    #[test]
    fn autostart_places_and_pins_attach() {
        let Ok(sim) = build_simulation(&ScenarioConfig::static_battery()) else {
            panic!("static_battery should build");
        };
        let infra = &sim.world().infrastructure;
        assert!(infra.application_id("video_analytics").is_some());

        let Some(edge) = sim.world().domain("edge") else {
            panic!("edge domain missing");
        };
        assert_eq!(edge.distributor_name(), "static");
        let battery = edge.source_id("battery").and_then(|id| edge.source(id));
        assert_eq!(battery.map(PowerSource::entity_count), Some(3));
    }

    #[test]
    fn unnamed_sources_get_generated_names() {
        let mut cfg = ScenarioConfig::fog_baseline();
        for d in &mut cfg.domains {
            for s in &mut d.sources {
                s.name = None;
            }
        }
        let Ok(sim) = build_simulation(&cfg) else {
            panic!("should build");
        };
        let edge: Vec<String> = sim
            .world()
            .domain("edge")
            .map(|d| d.sources().map(|(_, s)| s.name.clone()).collect())
            .unwrap_or_default();
        assert_eq!(edge, ["solar_0", "grid_1"]);
        assert!(sim.world().domain("cloud").and_then(|d| d.source_id("grid_2")).is_some());
    }
}
