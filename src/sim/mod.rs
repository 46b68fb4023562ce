/// Per-tick carbon records and the run report.
pub mod carbon;
/// Simulated wall clock.
pub mod clock;
pub mod distributor;
pub mod domain;
/// Timed events acting on the world.
pub mod event;
pub mod scheduler;
pub mod types;
pub mod world;

pub use carbon::{CarbonReport, CarbonSample, EntityCarbon, SourceCarbon};
pub use clock::SimClock;
pub use distributor::{
    CapacityBudget, DistributionContext, Distributor, PriorityDistributor, StaticDistributor,
};
pub use domain::{PowerDomain, PowerDomainBuilder};
pub use event::{Event, EventContext, EventDomain, FiredEvent, Repeat};
pub use scheduler::Simulation;
pub use types::SimConfig;
pub use world::World;
