//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use fog_power_sim::id::EntityId;
use fog_power_sim::infra::{Infrastructure, PowerEntity};
use fog_power_sim::sim::{SimConfig, Simulation};

/// Five-minute ticks over `duration_min`, starting at midnight, seed 7.
pub fn config(duration_min: u64) -> SimConfig {
    SimConfig::new(5, duration_min, 7)
}

/// `count` nodes named `n0`, `n1`, ... each drawing a flat `watts`.
pub fn idle_nodes(count: usize, watts: f64) -> (Infrastructure, Vec<EntityId>) {
    let mut infra = Infrastructure::new();
    let ids = (0..count)
        .map(|i| {
            infra
                .add_entity(PowerEntity::node(format!("n{i}"), 10.0, watts, watts))
                .expect("fresh node names should register")
        })
        .collect();
    (infra, ids)
}

/// Name of the source powering `entity` in `domain`, if any.
pub fn source_of(sim: &Simulation, domain: &str, entity: EntityId) -> Option<String> {
    let world = sim.world();
    let source = world.infrastructure.entity(entity)?.source()?;
    let domain = world.domain(domain)?;
    domain.source(source).map(|s| s.name.clone())
}

/// Per-tick carbon totals of `domain`.
pub fn emitted(sim: &Simulation, domain: &str) -> Vec<f64> {
    sim.world()
        .domain(domain)
        .map(|d| d.carbon_emitted().to_vec())
        .unwrap_or_default()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

pub fn assert_all_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert_close(*a, *e);
    }
}
