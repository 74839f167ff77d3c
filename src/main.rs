//! devcache-cli entry point.
//!
//! ## CLI Subcommands
//!
//! - `devcache-cli config show|defaults|validate` - Algorithm selection
//! - `devcache-cli algorithms` - Registered algorithms
//! - `devcache-cli stats [--json]` - Simulated workload stats

use std::process::ExitCode;

use devcache_core::cli::{run_algorithms, run_defaults, run_show, run_stats, run_validate};
use devcache_core::telemetry;

fn main() -> ExitCode {
    if let Err(e) = telemetry::init_logging(&telemetry::config_from_env()) {
        eprintln!("Logging disabled: {}", e);
    }
    telemetry::describe_metrics();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "config" => match args.get(2).map(|s| s.as_str()) {
            Some("show") | None => {
                run_show();
                ExitCode::SUCCESS
            }
            Some("defaults") => {
                run_defaults();
                ExitCode::SUCCESS
            }
            Some("validate") => ExitCode::from(run_validate() as u8),
            Some(other) => {
                eprintln!("Unknown config subcommand: {}", other);
                print_usage();
                ExitCode::FAILURE
            }
        },
        "algorithms" => {
            run_algorithms();
            ExitCode::SUCCESS
        }
        "stats" => {
            let json = args.iter().skip(2).any(|a| a == "--json");
            ExitCode::from(run_stats(json) as u8)
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("devcache-cli {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("devcache-cli {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("USAGE:");
    println!("    devcache-cli <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("    config show        Print effective algorithm selection");
    println!("    config defaults    Print built-in defaults");
    println!("    config validate    Check selected algorithms are registered");
    println!("    algorithms         List registered algorithms per device class");
    println!("    stats [--json]     Run a simulated workload and print memory stats");
    println!("    help               Show this message");
    println!("    version            Show version");
    println!();
    println!("ENVIRONMENT:");
    println!("    DEVCACHE_DEVICE_MEMCACHING_ALGORITHM   Device algorithm (default BF)");
    println!("    DEVCACHE_HOST_MEMCACHING_ALGORITHM     Host algorithm (default BF)");
    println!("    DEVCACHE_LOG_FORMAT                    json or pretty");
    println!("    DEVCACHE_LOG_FILE                      Append logs to this file");
    println!("    RUST_LOG                               Log filter");
}
