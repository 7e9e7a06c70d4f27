mod assertions;
mod browser;
mod context;
mod errors;
mod executors;
mod limits;
mod loader;
mod locator;
mod protocol;
mod report;
mod retry;
mod runner;
mod scenarios;
mod telemetry;
mod validation;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use browser::{BrowserConfig, BrowserLauncher};
use limits::ExecutionLimits;
use protocol::{RunReport, Scenario};
use runner::{run_scenario, RunOptions};
use telemetry::TelemetryConfig;

/// Every scenario passed.
const EXIT_PASSED: u8 = 0;
/// At least one scenario failed or aborted.
const EXIT_FAILED: u8 = 1;
/// Nothing was run: bad arguments, unreadable or invalid scenarios.
const EXIT_USAGE: u8 = 2;

#[derive(Parser)]
#[command(name = "ui-harness")]
#[command(about = "Browser-driven UI verification harness", long_about = None, version)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs scenarios against a live app; all built-ins when none is given
    Run(RunArgs),

    /// Validates scenario files without launching a browser
    Validate {
        /// Scenario JSON file
        #[arg(short, long, required = true)]
        scenario: Vec<PathBuf>,
    },

    /// Lists built-in scenarios
    List,
}

#[derive(Args)]
struct RunArgs {
    /// Scenario JSON file
    #[arg(short, long)]
    scenario: Vec<PathBuf>,

    /// Built-in scenario name (see `list`)
    #[arg(short, long)]
    builtin: Vec<String>,

    /// Overrides each scenario's base URL
    #[arg(long, env = "HARNESS_BASE_URL")]
    base_url: Option<String>,

    /// Scenario variable override, `key=value`
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = loader::parse_var)]
    vars: Vec<(String, String)>,

    /// Where screenshots are written
    #[arg(long, env = "HARNESS_OUTPUT_DIR", default_value = runner::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Writes all run reports to this file as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Shows the browser window
    #[arg(long)]
    headed: bool,

    /// Chrome/Chromium binary
    #[arg(long, env = "CHROME_PATH")]
    chrome: Option<PathBuf>,

    /// Disables the Chrome sandbox (containers running as root)
    #[arg(long)]
    no_sandbox: bool,

    /// Skips the HTTP reachability probe before launch
    #[arg(long)]
    no_preflight: bool,

    /// Generous execution limits instead of the HARNESS_* ones
    #[arg(long)]
    relaxed: bool,
}

impl RunArgs {
    fn limits(&self) -> ExecutionLimits {
        if self.relaxed {
            ExecutionLimits::relaxed()
        } else {
            ExecutionLimits::from_env()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = telemetry::init_telemetry(TelemetryConfig::from_env().verbose(cli.verbose)) {
        eprintln!("telemetry unavailable: {:#}", e);
    }

    let code = match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Validate { scenario } => validate(&scenario),
        Commands::List => list(),
    };

    telemetry::shutdown_telemetry();
    ExitCode::from(code)
}

// ============================================================================
// COMMANDS
// ============================================================================

async fn run(args: RunArgs) -> u8 {
    let limits = args.limits();

    let scenarios = match resolve_scenarios(&args) {
        Ok(scenarios) => scenarios,
        Err(e) => {
            eprintln!("{:#}", e);
            return EXIT_USAGE;
        }
    };
    if !all_valid(&scenarios, &limits) {
        return EXIT_USAGE;
    }

    let Some(launcher) = launcher() else {
        eprintln!("ui-harness was built without a browser driver (enable the `cdp` feature)");
        return EXIT_USAGE;
    };

    let options = RunOptions {
        browser: BrowserConfig {
            headless: !args.headed,
            sandbox: !args.no_sandbox,
            executable: args.chrome.clone(),
            ..BrowserConfig::default()
        },
        limits,
        output_dir: args.output_dir.clone(),
        preflight: !args.no_preflight,
    };

    let mut reports: Vec<RunReport> = Vec::with_capacity(scenarios.len());
    for scenario in &scenarios {
        let report = run_scenario(launcher.as_ref(), scenario, &options).await;
        print!("{}", report::finalize(&report).text);
        reports.push(report);
    }

    if let Some(path) = &args.report {
        if let Err(e) = report::write_json(&reports, path) {
            eprintln!("{:#}", e);
            return EXIT_USAGE;
        }
        tracing::info!(path = %path.display(), "run report written");
    }

    if reports.iter().all(RunReport::passed) {
        EXIT_PASSED
    } else {
        EXIT_FAILED
    }
}

fn validate(paths: &[PathBuf]) -> u8 {
    let limits = ExecutionLimits::from_env();
    let mut ok = true;

    for path in paths {
        match loader::load_scenario_from_file(path) {
            Ok(scenario) => {
                if all_valid(std::slice::from_ref(&scenario), &limits) {
                    println!(
                        "ok {}: {} ({} steps)",
                        path.display(),
                        scenario.id,
                        scenario.steps.len()
                    );
                } else {
                    ok = false;
                }
            }
            Err(e) => {
                eprintln!("{:#}", e);
                ok = false;
            }
        }
    }

    if ok {
        EXIT_PASSED
    } else {
        EXIT_USAGE
    }
}

fn list() -> u8 {
    for scenario in scenarios::all() {
        println!(
            "{:<16} {} ({} steps)",
            scenario.id,
            scenario.description,
            scenario.steps.len()
        );
    }
    EXIT_PASSED
}

// ============================================================================
// HELPERS
// ============================================================================

/// Files first, then built-ins, in the order given. No selection means every
/// built-in.
fn resolve_scenarios(args: &RunArgs) -> Result<Vec<Scenario>> {
    let mut selected = Vec::new();
    for path in &args.scenario {
        selected.push(loader::load_scenario_from_file(path)?);
    }
    for name in &args.builtin {
        selected.push(loader::load_builtin(name)?);
    }
    if selected.is_empty() {
        selected = scenarios::all();
    }

    for scenario in &mut selected {
        loader::apply_overrides(scenario, args.base_url.as_deref(), &args.vars);
    }
    Ok(selected)
}

/// Prints every validation error; true when there were none.
fn all_valid(scenarios: &[Scenario], limits: &ExecutionLimits) -> bool {
    let mut valid = true;
    for scenario in scenarios {
        if let Err(errors) = validation::validate_scenario(scenario, limits) {
            valid = false;
            for err in errors {
                eprintln!("{}: [{}] {}", scenario.id, err.code(), err);
            }
        }
    }
    valid
}

#[cfg(feature = "cdp")]
fn launcher() -> Option<Box<dyn BrowserLauncher>> {
    Some(Box::new(browser::cdp::CdpLauncher))
}

#[cfg(not(feature = "cdp"))]
fn launcher() -> Option<Box<dyn BrowserLauncher>> {
    None
}
