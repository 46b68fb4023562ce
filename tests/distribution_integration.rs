//! End-to-end distribution runs through the scheduler.

mod common;

use common::{assert_all_close, assert_close, config, emitted, idle_nodes, source_of};
use fog_power_sim::error::PowerError;
use fog_power_sim::infra::{Application, Infrastructure, PowerEntity};
use fog_power_sim::sim::{
    Distributor, Event, EventDomain, PowerDomain, PriorityDistributor, Simulation,
    StaticDistributor,
};
use fog_power_sim::sources::{Battery, PowerSource, Profile, ProfileTable};

/// Solar with no output for the first ten minutes, then 100 W.
fn late_sun() -> PowerSource {
    let mut samples = vec![100.0; 144];
    samples[0] = 0.0;
    let table = ProfileTable::from_samples(samples, 10)
        .map(Profile::Table)
        .expect("144 ten-minute samples cover a day");
    PowerSource::solar("sun", table)
}

fn late_sun_run(distributor: impl Distributor + 'static) -> (Simulation, Vec<f64>) {
    let cfg = config(20);
    let (infra, ids) = idle_nodes(3, 10.0);
    let Ok(domain) = PowerDomain::builder("edge", &cfg)
        .source(late_sun())
        .source(PowerSource::grid("grid", Profile::Constant(100.0)))
        .entities(ids)
        .distributor(distributor)
        .build(&infra)
    else {
        panic!("domain should build");
    };
    let mut sim = Simulation::new(cfg, infra);
    sim.add_power_domain(domain);
    assert!(sim.run().is_ok());
    let emitted = emitted(&sim, "edge");
    (sim, emitted)
}

#[test]
fn grid_only_total_matches_closed_form() {
    let cfg = config(60);
    let (infra, ids) = idle_nodes(3, 10.0);
    let Ok(domain) = PowerDomain::builder("edge", &cfg)
        .source(PowerSource::grid("grid", Profile::Constant(100.0)))
        .entities(ids)
        .build(&infra)
    else {
        panic!("domain should build");
    };
    let mut sim = Simulation::new(cfg, infra);
    sim.add_power_domain(domain);
    assert_eq!(sim.run().ok(), Some(12));

    // 3 entities x 10 W x 1e-3 x 100 gCO2/kWh per tick
    assert_all_close(&emitted(&sim, "edge"), &[3.0; 12]);
    let total = sim.world().domain("edge").map(|d| d.total_carbon_emissions());
    assert_close(total.expect("edge should exist"), 36.0);
}

#[test]
fn non_smart_mode_leaves_entities_on_the_grid() {
    let (sim, emitted) = late_sun_run(PriorityDistributor::new());
    for entity in sim.world().infrastructure.entities().map(|(id, _)| id) {
        assert_eq!(source_of(&sim, "edge", entity).as_deref(), Some("grid"));
    }
    assert_all_close(&emitted, &[3.0, 3.0, 3.0, 3.0]);
}

#[test]
fn smart_mode_pulls_entities_onto_recovered_solar() {
    let (sim, emitted) = late_sun_run(PriorityDistributor::smart());
    for entity in sim.world().infrastructure.entities().map(|(id, _)| id) {
        assert_eq!(source_of(&sim, "edge", entity).as_deref(), Some("sun"));
    }
    // Solar capacity reaches the distributor one tick after its sample
    // boundary; from then on 30 W x 1e-3 x 46.
    assert_all_close(&emitted, &[3.0, 3.0, 3.0, 1.38]);
}

#[test]
fn shortfall_without_backup_is_fatal() {
    let cfg = config(20);
    let (infra, ids) = idle_nodes(2, 10.0);
    let Ok(domain) = PowerDomain::builder("edge", &cfg)
        .source(PowerSource::solar("sun", Profile::Constant(15.0)))
        .entities(ids)
        .build(&infra)
    else {
        panic!("domain should build");
    };
    let mut sim = Simulation::new(cfg, infra);
    sim.add_power_domain(domain);

    let err = sim.run().err();
    let Some(PowerError::UnpoweredEntities { domain, entities }) = err else {
        panic!("expected UnpoweredEntities, got {err:?}");
    };
    assert_eq!(domain, "edge");
    assert_eq!(entities, ["n1"]);

    // The failing tick is still on the ledger.
    assert_all_close(&emitted(&sim, "edge"), &[0.46]);
}

#[test]
fn drained_battery_hands_over_to_the_grid() {
    let cfg = config(60);
    let (infra, ids) = idle_nodes(1, 10.0);
    let node = ids[0];
    let Ok(domain) = PowerDomain::builder("edge", &cfg)
        .source(PowerSource::battery("pack", Battery::new(100.0, 100.0, 10.0)))
        .source(PowerSource::grid("grid", Profile::Constant(100.0)))
        .entities(ids)
        .build(&infra)
    else {
        panic!("domain should build");
    };
    let mut sim = Simulation::new(cfg, infra);
    sim.add_power_domain(domain);
    assert!(sim.run().is_ok());

    let mut expected = vec![0.0; 10];
    expected.extend([1.0, 1.0]);
    assert_all_close(&emitted(&sim, "edge"), &expected);
    assert_eq!(source_of(&sim, "edge", node).as_deref(), Some("grid"));

    let remaining = sim
        .world()
        .domain("edge")
        .and_then(|d| d.source_id("pack").and_then(|id| d.source(id)))
        .and_then(PowerSource::as_battery)
        .map(Battery::remaining_power);
    assert_eq!(remaining, Some(0.0));
}

#[test]
fn static_mode_pauses_a_starved_path_and_resumes_it_after_recharge() {
    let cfg = config(20);
    let mut infra = Infrastructure::new();
    let a = infra
        .add_entity(PowerEntity::node("a", 10.0, 10.0, 10.0))
        .expect("a should register");
    let b = infra
        .add_entity(PowerEntity::node("b", 10.0, 10.0, 10.0))
        .expect("b should register");
    let l = infra
        .add_entity(PowerEntity::link("l", 100.0, 2.0, 0.0))
        .expect("l should register");
    let app = Application::new("pipe")
        .with_task("produce", 1.0, a)
        .with_task("consume", 1.0, b)
        .with_flow("data", 0, 1, 1.0, vec![l]);
    assert!(infra.place(app).is_ok());

    let Ok(mut domain) = PowerDomain::builder("edge", &cfg)
        .source(PowerSource::battery("pack", Battery::new(50.0, 50.0, 25.0)))
        .source(PowerSource::grid("grid", Profile::Constant(100.0)))
        .entities([a, b, l])
        .distributor(StaticDistributor::new())
        .build(&infra)
    else {
        panic!("domain should build");
    };
    let pack = domain.source_id("pack").expect("pack should be in the domain");
    for entity in [a, b, l] {
        assert!(domain.pin(entity, pack, &mut infra).is_ok());
    }

    let mut events = EventDomain::new("events", &cfg);
    events.add(Event::at("recharge", 15, |ctx| {
        let (edge, _) = ctx.world.domain_mut("edge")?;
        let pack = edge.source_id("pack").ok_or(PowerError::UnknownSource)?;
        let grid = edge.source_id("grid").ok_or(PowerError::UnknownSource)?;
        edge.recharge_battery(pack, grid)?;
        Ok(())
    }));

    let mut sim = Simulation::new(cfg, infra);
    sim.add_power_domain(domain);
    sim.add_event_domain(events);
    assert!(sim.run().is_ok());

    let Some(edge) = sim.world().domain("edge") else {
        panic!("edge missing");
    };
    // 22 W drawn at 0 and 5 (50 -> 6), nothing while paused at 10, then
    // 22 W again after the recharge at 15.
    let drawn: Vec<f64> = edge
        .records()
        .iter()
        .filter_map(|r| r.source("pack").map(|s| s.power_used()))
        .collect();
    assert_all_close(&drawn, &[22.0, 22.0, 0.0, 22.0]);

    let battery = edge.source(pack).and_then(PowerSource::as_battery);
    assert_eq!(battery.map(Battery::remaining_power), Some(28.0));
    assert_eq!(battery.map(|b| b.recharges().len()), Some(1));
    // 44 Wh over two ticks at 100 gCO2/kWh
    assert_close(edge.recharge_carbon(), 4.4);

    let infra = &sim.world().infrastructure;
    for entity in [a, b, l] {
        assert_eq!(infra.entity(entity).map(PowerEntity::is_paused), Some(false));
    }
    assert_close(edge.total_carbon_emissions(), 0.0);
}

#[test]
fn battery_is_debited_by_what_its_budget_handed_out() {
    let cfg = config(10);
    let mut infra = Infrastructure::new();
    let small = infra
        .add_entity(PowerEntity::node("small", 10.0, 4.6, 4.6))
        .expect("small should register");
    let large = infra
        .add_entity(PowerEntity::node("large", 10.0, 17.1, 17.1))
        .expect("large should register");
    let Ok(domain) = PowerDomain::builder("edge", &cfg)
        .source(PowerSource::battery("pack", Battery::new(21.7, 21.7, 10.0)))
        .source(PowerSource::grid("grid", Profile::Constant(100.0)))
        .entities([small, large])
        .build(&infra)
    else {
        panic!("domain should build");
    };
    let mut sim = Simulation::new(cfg, infra);
    sim.add_power_domain(domain);

    // 4.6 + 17.1 sums to just over 21.7 in floating point.
    let result = sim.run();
    assert!(result.is_ok(), "run failed: {:?}", result.err());

    let remaining = sim
        .world()
        .domain("edge")
        .and_then(|d| d.source_id("pack").and_then(|id| d.source(id)))
        .and_then(PowerSource::as_battery)
        .map(Battery::remaining_power)
        .expect("pack should still be a battery");
    assert!(remaining.abs() < 1e-9, "{remaining}");
    assert_all_close(&emitted(&sim, "edge"), &[0.0, 2.17]);
    assert_eq!(source_of(&sim, "edge", large).as_deref(), Some("grid"));
}
