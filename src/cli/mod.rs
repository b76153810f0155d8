//! CLI command handling
//!
//! Builds the effective configuration, runs scenarios and prints results.

use std::time::Duration;

use colored::Colorize;

use crate::commands::{Commands, GlobalOptions};
use crate::common::config::Config;
use crate::common::Result;
use crate::testing::{builtin, collect_scenario_paths, report, Runner, Scenario, SuiteOutcome};
use crate::transport::LaunchSpec;

/// Dispatch a CLI command
///
/// Returns whether every scenario passed.
pub async fn dispatch(command: Commands, options: GlobalOptions) -> Result<bool> {
    let config = effective_config(&options)?;

    match command {
        Commands::ShowConfig => {
            if let Some(path) = options.config.clone().or_else(crate::common::paths::config_path) {
                println!("{}", format!("# {}", path.display()).dimmed());
            }
            print!("{}", config.render_masked()?);
            Ok(true)
        }

        Commands::Run { paths } => {
            let files = collect_scenario_paths(&paths)?;
            let scenarios = files
                .iter()
                .map(|path| Scenario::load(path))
                .collect::<Result<Vec<_>>>()?;
            if scenarios.is_empty() {
                println!("No scenario files found");
                return Ok(true);
            }
            run_and_report(&config, &scenarios).await
        }

        Commands::Builtin { database } => {
            let mut scenarios = builtin::standard_suite();
            if database {
                scenarios.push(builtin::database_workflow());
            }
            run_and_report(&config, &scenarios).await
        }
    }
}

/// Load the configuration file and apply command-line overrides
pub fn effective_config(options: &GlobalOptions) -> Result<Config> {
    let mut config = Config::load(options.config.as_deref())?;
    apply_overrides(&mut config, options);
    Ok(config)
}

fn apply_overrides(config: &mut Config, options: &GlobalOptions) {
    if let Some(server) = &options.server {
        config.server.command = Some(server.clone());
        config.server.args.clear();
    }
    config.server.args.extend(options.args.iter().cloned());
    for (key, value) in &options.env {
        config.server.env.insert(key.clone(), value.clone());
    }
    if let Some(mode) = options.mode {
        config.session.mode = mode;
    }
    if let Some(secs) = options.message_timeout {
        config.timeouts.message_secs = secs;
    }
    if let Some(secs) = options.scenario_timeout {
        config.timeouts.scenario_secs = secs;
    }
    if let Some(path) = &options.report {
        config.report.path = Some(path.clone());
    }
}

async fn run_and_report(config: &Config, scenarios: &[Scenario]) -> Result<bool> {
    let spec = LaunchSpec::from_config(config)?;

    println!("{}", "MCP Conformance Suite".bold());
    println!("{}", "=".repeat(50));
    println!("Server: {}", spec.command_line());
    println!(
        "Database: {}",
        config
            .server
            .env
            .get("DB_URL")
            .map(String::as_str)
            .unwrap_or("Not set")
    );
    println!(
        "Timeouts: {}s per message, {}s per scenario",
        config.timeouts.message_secs, config.timeouts.scenario_secs
    );

    let runner = Runner::from_config(spec, config);
    let mut suite = SuiteOutcome::default();
    for scenario in scenarios {
        let outcome = runner.run_scenario(scenario).await;
        report::print_scenario(&outcome);
        suite.scenarios.push(outcome);
    }

    report::print_summary(&suite);

    if let Some(path) = &config.report.path {
        report::save_json(&suite, path)?;
        println!("Detailed report saved to: {}", path.display());
    }

    let elapsed: Duration = suite.scenarios.iter().map(|s| s.elapsed).sum();
    tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "Run complete");

    Ok(suite.is_success())
}
