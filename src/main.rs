//! Estimator replay entry point — CLI wiring and fatal-error reporting.

use std::path::PathBuf;
use std::process;

use dse_sim::config::EstimatorConfig;
use dse_sim::io::readings::ReadingLog;
use dse_sim::runner::replay;
use dse_sim::sim::entity::Estimator;

/// Parsed CLI arguments.
struct CliArgs {
    config_path: PathBuf,
    readings_path: PathBuf,
    horizon: u64,
    seed_override: Option<u64>,
}

fn print_help() {
    eprintln!("dse-sim — distribution state estimator replay");
    eprintln!();
    eprintln!("Usage: dse-sim --config <path> --readings <path> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>      Estimator TOML configuration (required)");
    eprintln!("  --readings <path>    Recorded reading log CSV (required)");
    eprintln!("  --horizon <u64>      Stop after this simulated time (default: 86400)");
    eprintln!("  --seed <u64>         Override the solver seed");
    eprintln!("  --help               Show this help message");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut readings_path = None;
    let mut horizon = 86_400u64;
    let mut seed_override = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --config requires a path argument");
                    process::exit(1);
                }
                config_path = Some(PathBuf::from(&args[i]));
            }
            "--readings" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --readings requires a path argument");
                    process::exit(1);
                }
                readings_path = Some(PathBuf::from(&args[i]));
            }
            "--horizon" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --horizon requires a u64 argument");
                    process::exit(1);
                }
                match args[i].parse::<u64>() {
                    Ok(h) => horizon = h,
                    Err(_) => {
                        eprintln!("error: --horizon value \"{}\" is not a valid u64", args[i]);
                        process::exit(1);
                    }
                }
            }
            "--seed" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --seed requires a u64 argument");
                    process::exit(1);
                }
                match args[i].parse::<u64>() {
                    Ok(s) => seed_override = Some(s),
                    Err(_) => {
                        eprintln!("error: --seed value \"{}\" is not a valid u64", args[i]);
                        process::exit(1);
                    }
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    let (Some(config_path), Some(readings_path)) = (config_path, readings_path) else {
        eprintln!("error: --config and --readings are required");
        print_help();
        process::exit(1);
    };
    CliArgs {
        config_path,
        readings_path,
        horizon,
        seed_override,
    }
}

fn main() {
    env_logger::init();
    let args = parse_args();

    let mut config = match EstimatorConfig::from_toml_file(&args.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };
    if let Some(seed) = args.seed_override {
        config.estimation.seed = seed;
    }
    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("error: {e}");
        }
        process::exit(1);
    }

    let results_path = config.files.results.clone();
    let mut estimator = match Estimator::new(config) {
        Ok(estimator) => estimator,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };
    let log = match ReadingLog::load(&args.readings_path) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    match replay(&mut estimator, &log, args.horizon) {
        Ok(summary) => {
            println!(
                "replay complete: {} steps, {} estimation cycles appended to {}",
                summary.steps,
                summary.cycles,
                results_path.display()
            );
            println!(
                "last status: {} messages at t={}",
                summary.last_status.messages, summary.last_status.time
            );
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
