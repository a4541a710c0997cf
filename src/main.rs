//! Strata demo entrypoint.
//!
//! Plans and applies the built-in web-server deployment against the
//! simulated provider, then checks drift and tears everything down.

use std::process::ExitCode;
use std::sync::Arc;

use strata::config::{ConfigParser, ConfigValidator, EngineConfig, find_config_file};
use strata::error::Result;
use strata::output::{OutputFormat, OutputFormatter};
use strata::planner::{PlanOptions, cancellation};
use strata::resource::catalog;
use strata::topology::{TopologyParams, web_server};
use strata::{Engine, MemoryStateStore, SimulatedProvider};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    init_logging(std::env::var_os("STRATA_VERBOSE").is_some());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads `strata.yaml` if one is found, otherwise uses defaults.
fn load_config() -> Result<EngineConfig> {
    let parser = ConfigParser::new();
    parser.load_dotenv()?;

    let cwd = std::env::current_dir()?;
    let config = match find_config_file(&cwd) {
        Ok(path) => parser.load_with_env(path)?,
        Err(_) => {
            info!("No configuration file found, using defaults");
            let mut config = EngineConfig::new("web-server");
            ConfigParser::apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
            config
        }
    };

    let result = ConfigValidator::new().validate(&config)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }
    Ok(config)
}

/// Runs the demo. Returns whether every step succeeded.
async fn run() -> Result<bool> {
    let config = load_config()?;
    let format = std::env::var("STRATA_OUTPUT")
        .ok()
        .map(|s| s.parse::<OutputFormat>())
        .transpose()?
        .unwrap_or_default();
    let formatter = OutputFormatter::new(format);

    let deployment = web_server(&TopologyParams::new(config.provider.region.clone()));
    let engine = Engine::new(
        Arc::new(SimulatedProvider::new()),
        Arc::new(MemoryStateStore::new()),
        config,
    )
    .with_schema(catalog::network());

    let (handle, cancel) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight calls");
            handle.cancel();
        }
    });

    let options = PlanOptions::default();
    let changes = engine.plan(&deployment, &options).await?;
    eprintln!("{}", formatter.format_plan(&changes));

    let report = engine.apply(&deployment, &options, &cancel).await?;
    eprintln!("{}", formatter.format_report(&report));
    if !report.is_success() {
        return Ok(false);
    }

    let replan = engine.plan(&deployment, &options).await?;
    eprintln!("{}", formatter.format_plan(&replan));

    let drift = engine.check_drift().await?;
    eprintln!("{}", formatter.format_drift(&drift));

    let teardown = engine.destroy(&cancel).await?;
    eprintln!("{}", formatter.format_report(&teardown));

    Ok(teardown.is_success())
}
