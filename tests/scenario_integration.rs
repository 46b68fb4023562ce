//! Config-driven runs: presets and TOML scenarios end to end.

use std::fs;

use fog_power_sim::config::ScenarioConfig;
use fog_power_sim::io::export::write_csv;
use fog_power_sim::runner::run_scenario;
use fog_power_sim::scenario::{ScenarioError, build_simulation};

#[test]
fn every_preset_runs_to_its_horizon() {
    for name in ScenarioConfig::PRESETS {
        let Ok(cfg) = ScenarioConfig::from_preset(name) else {
            panic!("preset {name} should load");
        };
        let ticks = (cfg.simulation.duration_min / cfg.simulation.update_interval_min) as usize;
        let result = run_scenario(&cfg);
        let Ok(result) = result else {
            panic!("preset {name} failed: {:?}", result.err());
        };
        for ledger in &result.ledgers {
            assert_eq!(ledger.records.len(), ticks, "{name}/{}", ledger.domain);
        }
        for report in &result.reports {
            assert!(report.total_carbon.is_finite());
            assert!(report.total_carbon >= 0.0);
        }
    }
}

#[test]
fn solar_outage_is_repaired_the_next_morning() {
    let Ok(result) = run_scenario(&ScenarioConfig::solar_smart()) else {
        panic!("solar_smart should run");
    };
    let fired: Vec<(&str, u64)> = result
        .fired
        .iter()
        .map(|f| (f.name.as_str(), f.time_min))
        .collect();
    assert_eq!(fired, [("solar_outage", 19 * 60), ("solar_repair", 24 * 60 + 5 * 60)]);

    let Some(edge) = result.reports.iter().find(|r| r.domain == "edge") else {
        panic!("edge report missing");
    };
    let sources: Vec<&str> = edge.per_source.iter().map(|(s, _)| s.as_str()).collect();
    assert!(sources.contains(&"solar"));
    assert!(sources.contains(&"grid"));
}

#[test]
fn static_battery_books_recharge_carbon() {
    let Ok(result) = run_scenario(&ScenarioConfig::static_battery()) else {
        panic!("static_battery should run");
    };
    let recharges = result.fired.iter().filter(|f| f.name == "recharge").count();
    assert_eq!(recharges, 3);

    let Some(edge) = result.reports.iter().find(|r| r.domain == "edge") else {
        panic!("edge report missing");
    };
    assert!(edge.recharge_carbon > 0.0);
    // Everything on the edge runs from the battery, which emits nothing itself.
    assert_eq!(edge.total_carbon, 0.0);
}

#[test]
fn seed_override_keeps_runs_reproducible() {
    let mut cfg = ScenarioConfig::solar_smart();
    cfg.simulation.seed = 1234;
    let (Ok(a), Ok(b)) = (run_scenario(&cfg), run_scenario(&cfg)) else {
        panic!("runs should succeed");
    };
    assert_eq!(a.total_carbon(), b.total_carbon());
}

#[test]
fn toml_scenario_with_csv_profile_runs() {
    let dir = std::env::temp_dir().join(format!("fog-power-sim-{}", std::process::id()));
    assert!(fs::create_dir_all(&dir).is_ok());
    let csv_path = dir.join("grid.csv");
    // 100 for the first ten minutes of the day, 300 after.
    let mut data = String::from("time,value\n");
    for i in 0..144u64 {
        let value = if i == 0 { 100 } else { 300 };
        data.push_str(&format!("{:02}:{:02},{value}\n", i * 10 / 60, i * 10 % 60));
    }
    assert!(fs::write(&csv_path, data).is_ok());

    let toml = format!(
        r#"
[simulation]
update_interval_min = 5
duration_min = 20
start_time = "00:00"

[[nodes]]
name = "fog"
cu = 10.0
static_w = 10.0
max_w = 10.0

[[domains]]
name = "edge"
entities = ["fog"]

[[domains.sources]]
name = "grid"
kind = "grid"
profile = {{ type = "csv", path = "{}", interval_min = 10 }}
"#,
        csv_path.display()
    );
    let cfg = ScenarioConfig::from_toml_str(&toml);
    let Ok(cfg) = cfg else {
        panic!("TOML should parse: {:?}", cfg.err());
    };
    let result = run_scenario(&cfg);
    let Ok(result) = result else {
        panic!("scenario should run: {:?}", result.err());
    };

    // Intensity is read after each tick's cursor update: 100, 100, 300, 300.
    let per_tick: Vec<f64> = result.ledgers[0].records.iter().map(|r| r.total()).collect();
    assert_eq!(per_tick.len(), 4);
    for (got, want) in per_tick.iter().zip([1.0, 1.0, 3.0, 3.0]) {
        assert!((got - want).abs() < 1e-9, "{per_tick:?}");
    }

    let mut out = Vec::new();
    assert!(write_csv(&result.ledger_refs(), &mut out).is_ok());
    assert_eq!(String::from_utf8_lossy(&out).lines().count(), 5);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn two_grids_in_one_domain_fail_to_build() {
    let mut cfg = ScenarioConfig::fog_baseline();
    let mut second = cfg.domains[0].sources[1].clone();
    second.name = Some("grid_b".to_string());
    cfg.domains[0].sources.push(second);
    let err = build_simulation(&cfg).err();
    assert!(matches!(err, Some(ScenarioError::Power(_))), "{err:?}");
}

#[test]
fn unpinned_static_entity_is_rejected_before_the_run() {
    let mut cfg = ScenarioConfig::static_battery();
    cfg.domains[0].sources[0].pin.retain(|e| e != "sensor");
    let err = build_simulation(&cfg).err();
    let Some(ScenarioError::Config(errors)) = err else {
        panic!("expected a config error, got {err:?}");
    };
    assert!(errors.iter().any(|e| e.message.contains("\"sensor\"")), "{errors:?}");
}
