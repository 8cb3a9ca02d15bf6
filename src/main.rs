//! FlowRunner CLI Entry Point
//!
//! Runs a flow definition once and prints a per-step summary.
//!
//! # Usage
//!
//! ```bash
//! # Run a flow
//! flowrunner flow.yaml
//!
//! # Pass variables (override the flow's env block)
//! flowrunner flow.yaml --var BASE_URL=https://staging.example.com
//!
//! # Show common cron expressions for schedule definitions
//! flowrunner --presets
//! ```

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use log::error;
use tokio_util::sync::CancellationToken;

use flowrunner::execution::{ActionRegistry, Engine};
use flowrunner::flow::parser::load_flow;
use flowrunner::scheduler::common_presets;
use flowrunner::store::{Execution, ExecutionStatus, MemoryStore, StepStatus};
use flowrunner::{APP_NAME, VERSION};

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    flow_path: Option<String>,
    variables: HashMap<String, String>,
    verbose: bool,
    show_presets: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: flowrunner [OPTIONS] <FLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <FLOW_FILE>         Path to flow YAML file");
    println!();
    println!("Options:");
    println!("  --var KEY=VALUE     Set a variable (repeatable, overrides flow env)");
    println!("  --presets           List common cron expressions for schedules");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  flowrunner checkout.yaml");
    println!("  flowrunner checkout.yaml --var BASE_URL=https://staging.example.com");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--presets" => {
                config.show_presets = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--var" => {
                i += 1;
                if i >= args.len() {
                    return Err("--var requires a KEY=VALUE argument".to_string());
                }
                let (key, value) = args[i]
                    .split_once('=')
                    .ok_or_else(|| format!("Invalid --var '{}', expected KEY=VALUE", args[i]))?;
                config.variables.insert(key.to_string(), value.to_string());
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.flow_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.flow_path = Some(arg.clone());
            }
        }
        i += 1;
    }

    Ok(config)
}

fn print_presets() {
    println!("Common cron expressions:");
    println!();
    for (name, expr) in common_presets() {
        println!("  {:<22} {}", expr, name);
    }
}

/// Prints the per-step summary after a run.
fn print_summary(execution: &Execution) {
    println!();
    for step in &execution.steps {
        let label = match step.status {
            StepStatus::Passed => "PASS".green(),
            StepStatus::Failed => "FAIL".red(),
            StepStatus::Skipped => "SKIP".yellow(),
        };
        let attempts = if step.attempts > 1 {
            format!(" ({} attempts)", step.attempts)
        } else {
            String::new()
        };

        print!("  [{}] {:<9} {}{}", label, step.phase.to_string(), step.step_id, attempts);
        if let Some(error) = &step.error {
            print!("  {}", error.dimmed());
        }
        println!();
    }

    println!();
    let verdict = match execution.status {
        ExecutionStatus::Passed => "PASSED".green().bold(),
        ExecutionStatus::Cancelled => "CANCELLED".yellow().bold(),
        _ => "FAILED".red().bold(),
    };
    println!(
        "{}: {} ({}/{} steps passed)",
        execution.flow_name.bold(),
        verdict,
        execution.steps_passed,
        execution.steps_total
    );
}

/// Main application entry point.
async fn run() -> Result<ExecutionStatus, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);

    if config.show_presets {
        print_presets();
        return Ok(ExecutionStatus::Passed);
    }

    let Some(flow_path) = config.flow_path else {
        print_usage();
        return Err("no flow file given".into());
    };

    println!("{} v{}", APP_NAME, VERSION);
    println!();

    let flow = load_flow(&flow_path).map_err(|e| {
        error!("Failed to load flow: {}", e);
        format!("Could not load flow from '{}': {}", flow_path, e)
    })?;

    let engine = Engine::new(Arc::new(MemoryStore::new()), ActionRegistry::with_builtins());
    let execution = engine
        .execute(&flow, config.variables, "manual", CancellationToken::new())
        .await?;

    print_summary(&execution);
    Ok(execution.status)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(ExecutionStatus::Passed) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
