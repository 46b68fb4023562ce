//! Fog power simulator entry point: CLI wiring around a config-driven run.

use std::path::Path;
use std::process;

use fog_power_sim::config::ScenarioConfig;
use fog_power_sim::io::export::export_csv;
use fog_power_sim::runner::run_scenario;
use fog_power_sim::telemetry::init_tracing;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    ledger: bool,
    ledger_out: Option<String>,
}

fn print_help() {
    eprintln!("fog-power-sim: power distribution and carbon accounting for fog infrastructure");
    eprintln!();
    eprintln!("Usage: fog-power-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --ledger                 Print one ledger line per domain per tick");
    eprintln!("  --ledger-out <path>      Export the carbon ledger to CSV");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the fog_baseline preset is used.");
    eprintln!("Log verbosity follows RUST_LOG (default: info).");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        seed_override: None,
        ledger: false,
        ledger_out: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --scenario requires a path argument");
                    process::exit(1);
                }
                cli.scenario_path = Some(args[i].clone());
            }
            "--preset" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --preset requires a name argument");
                    process::exit(1);
                }
                cli.preset = Some(args[i].clone());
            }
            "--seed" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --seed requires a u64 argument");
                    process::exit(1);
                }
                if let Ok(s) = args[i].parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{}\" is not a valid u64", args[i]);
                    process::exit(1);
                }
            }
            "--ledger" => {
                cli.ledger = true;
            }
            "--ledger-out" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --ledger-out requires a path argument");
                    process::exit(1);
                }
                cli.ledger_out = Some(args[i].clone());
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    let cli = parse_args();
    init_tracing();

    // --scenario takes priority, then --preset, then the baseline
    let mut scenario = if let Some(ref path) = cli.scenario_path {
        match ScenarioConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else if let Some(ref name) = cli.preset {
        match ScenarioConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        ScenarioConfig::fog_baseline()
    };

    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let result = match run_scenario(&scenario) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    if cli.ledger {
        for ledger in &result.ledgers {
            for sample in &ledger.records {
                println!("[{}] {sample}", ledger.domain);
            }
        }
    }

    for event in &result.fired {
        println!("event {} fired at minute {}", event.name, event.time_min);
    }
    for report in &result.reports {
        println!("\n{report}");
    }
    println!("\nTotal released: {:.4} gCO2", result.total_carbon());

    if let Some(ref path) = cli.ledger_out {
        if let Err(e) = export_csv(&result.ledger_refs(), Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Ledger written to {path}");
    }
}
