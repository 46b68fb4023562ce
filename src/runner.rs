use crate::config::ScenarioConfig;
use crate::scenario::{ScenarioError, build_simulation};
use crate::sim::carbon::{CarbonReport, CarbonSample};
use crate::sim::event::FiredEvent;

/// Tick records of one power domain.
pub struct DomainLedger {
    pub domain: String,
    pub records: Vec<CarbonSample>,
}

pub struct SimulationResult {
    pub ledgers: Vec<DomainLedger>,
    pub reports: Vec<CarbonReport>,
    pub fired: Vec<FiredEvent>,
    /// Power and event tasks run by the scheduler.
    pub tasks_run: u64,
}

impl SimulationResult {
    /// Emissions summed over every domain.
    pub fn total_carbon(&self) -> f64 {
        self.reports.iter().map(|r| r.total_carbon).sum()
    }

    /// `(domain, records)` pairs for CSV export.
    pub fn ledger_refs(&self) -> Vec<(&str, &[CarbonSample])> {
        self.ledgers
            .iter()
            .map(|l| (l.domain.as_str(), l.records.as_slice()))
            .collect()
    }
}

/// Builds and runs a scenario to its horizon.
///
/// # Errors
///
/// Returns the build error, or the first power error raised while running
/// (an event callback failing, a domain left with unpowered entities).
pub fn run_scenario(config: &ScenarioConfig) -> Result<SimulationResult, ScenarioError> {
    let mut sim = build_simulation(config)?;
    let tasks_run = sim.run()?;

    let world = sim.world();
    let ledgers = world
        .domains
        .iter()
        .map(|d| DomainLedger {
            domain: d.name.clone(),
            records: d.records().to_vec(),
        })
        .collect();
    let reports = world.domains.iter().map(|d| d.report()).collect();
    let fired = sim
        .event_domains()
        .iter()
        .flat_map(|e| e.history().iter().cloned())
        .collect();

    Ok(SimulationResult {
        ledgers,
        reports,
        fired,
        tasks_run,
    })
}
