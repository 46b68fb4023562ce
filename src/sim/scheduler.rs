//! Discrete-time driver interleaving event domains and power domains.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tracing::{debug, info};

use super::clock::SimClock;
use super::domain::PowerDomain;
use super::event::EventDomain;
use super::types::SimConfig;
use super::world::World;
use crate::error::PowerError;
use crate::infra::Infrastructure;

/// Which task a wake-up belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskRef {
    Events(usize),
    Power(usize),
}

impl TaskRef {
    /// Tasks with a lower rank run first at the same instant.
    fn rank(self) -> u8 {
        match self {
            TaskRef::Events(_) => 0,
            TaskRef::Power(_) => 1,
        }
    }
}

/// A pending wake-up. Ordered by time, then rank, then registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Wake {
    at: u64,
    seq: u64,
    task: TaskRef,
}

impl Ord for Wake {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then(self.task.rank().cmp(&other.task.rank()))
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Wake {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Owns the world and the tasks acting on it.
///
/// Every task runs its whole tick before the next one starts and is then
/// re-armed one interval later. At a shared instant event domains always run
/// before power domains, so a distribution tick sees the effects of every
/// event due at that instant.
///
/// # Examples
///
/// ```
/// use fog_power_sim::infra::{Infrastructure, PowerEntity};
/// use fog_power_sim::sim::{PowerDomain, Simulation, SimConfig};
/// use fog_power_sim::sources::{PowerSource, Profile};
///
/// let config = SimConfig::new(1, 10, 0);
/// let mut infra = Infrastructure::new();
/// let fog = infra.add_entity(PowerEntity::node("fog", 10.0, 50.0, 50.0))?;
/// let domain = PowerDomain::builder("edge", &config)
///     .source(PowerSource::grid("grid", Profile::Constant(2.0)))
///     .entity(fog)
///     .build(&infra)?;
///
/// let mut sim = Simulation::new(config, infra);
/// sim.add_power_domain(domain);
/// sim.run()?;
///
/// let edge = sim.world().domain("edge").map(|d| d.total_carbon_emissions());
/// assert!((edge.unwrap_or_default() - 1.0).abs() < 1e-9);
/// # Ok::<(), fog_power_sim::error::PowerError>(())
/// ```
pub struct Simulation {
    config: SimConfig,
    clock: SimClock,
    world: World,
    events: Vec<EventDomain>,
    queue: BinaryHeap<Reverse<Wake>>,
    next_seq: u64,
}

impl Simulation {
    pub fn new(config: SimConfig, infrastructure: Infrastructure) -> Self {
        Self {
            clock: SimClock::new(config.start_min),
            config,
            world: World::new(infrastructure),
            events: Vec::new(),
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn event_domains(&self) -> &[EventDomain] {
        &self.events
    }

    /// Registers an event domain; it first runs at the current time.
    pub fn add_event_domain(&mut self, events: EventDomain) {
        let task = TaskRef::Events(self.events.len());
        self.events.push(events);
        self.arm(self.clock.now(), task);
    }

    /// Registers a power domain; it first ticks at the current time.
    pub fn add_power_domain(&mut self, domain: PowerDomain) {
        let task = TaskRef::Power(self.world.domains.len());
        self.world.domains.push(domain);
        self.arm(self.clock.now(), task);
    }

    fn arm(&mut self, at: u64, task: TaskRef) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Wake { at, seq, task }));
    }

    fn interval(&self, task: TaskRef) -> u64 {
        let interval = match task {
            TaskRef::Events(i) => self.events.get(i).map(EventDomain::tick_min),
            TaskRef::Power(i) => self.world.domains.get(i).map(PowerDomain::tick_min),
        };
        interval.unwrap_or(self.config.update_interval_min).max(1)
    }

    /// Runs every task whose wake-up falls before `horizon_min` elapsed
    /// minutes. Returns how many tasks ran.
    ///
    /// # Errors
    ///
    /// Stops at the first task error and returns it; the clock stays at the
    /// failing instant.
    pub fn run_until(&mut self, horizon_min: u64) -> Result<u64, PowerError> {
        info!(
            start = %self.clock.time_of_day(),
            horizon_min,
            power_domains = self.world.domains.len(),
            event_domains = self.events.len(),
            "simulation running"
        );
        let mut ran = 0;
        while let Some(Reverse(wake)) = self.queue.peek().copied() {
            if wake.at >= horizon_min {
                break;
            }
            self.queue.pop();
            self.clock.advance_to(wake.at);
            debug!(at = wake.at, task = ?wake.task, "wake");

            match wake.task {
                TaskRef::Events(i) => {
                    if let Some(events) = self.events.get_mut(i) {
                        events.fire_due(&self.clock, &mut self.world)?;
                    }
                }
                TaskRef::Power(i) => {
                    let World {
                        infrastructure,
                        domains,
                    } = &mut self.world;
                    if let Some(domain) = domains.get_mut(i) {
                        domain.tick(wake.at, infrastructure)?;
                    }
                }
            }
            ran += 1;
            let next = wake.at + self.interval(wake.task);
            self.arm(next, wake.task);
        }
        info!(now = self.clock.now(), tasks = ran, "simulation stopped");
        Ok(ran)
    }

    /// Runs for the configured duration.
    pub fn run(&mut self) -> Result<u64, PowerError> {
        self.run_until(self.config.duration_min)
    }
}
