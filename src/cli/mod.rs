//! CLI command handling
//!
//! Dispatches CLI commands and formats their console output.

use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use colored::Colorize;
use tracing::{info, warn};

use crate::api::{AlgClient, ApiCatalog};
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{logging, paths, Error, Result, Verdict};
use crate::mml::MmlCommand;
use crate::oracle::{format_metrics_table, search_occurrences, ExpectationTable};
use crate::remote::{connect, Gateway};
use crate::simconfig::generate_profiles;
use crate::steplog::StepLog;
use crate::testing::{ScenarioEnv, Suite, TestRunner};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            suite,
            config,
            only,
        } => run_suite(&suite, config.as_deref(), &only).await,

        Commands::Search {
            file,
            pattern,
            count,
            regex,
        } => {
            let outcome = search_occurrences(&file, &pattern, count, regex)?;
            print_verdict(outcome.verdict);
            println!(
                "  '{}' matched {} line(s) in {}",
                pattern,
                outcome.count,
                file.display()
            );
            outcome.verdict.into_result(format!("Search for '{pattern}' failed"))
        }

        Commands::Metrics { config } => {
            let config = Config::resolve(config.as_deref())?;
            let catalog = ApiCatalog::load(&config.automation.api_file)?;
            let client = AlgClient::new(&config)?;
            let snapshot = client
                .metrics(&catalog)
                .await
                .ok_or_else(|| Error::Api("No metrics returned from ALG Server".to_string()))?;
            println!("{}", format_metrics_table(&snapshot));
            Ok(())
        }

        Commands::GenConfigs {
            config,
            templates,
            out,
        } => {
            let config = Config::resolve(config.as_deref())?;
            let written = generate_profiles(&config, &templates, &out)?;
            for path in written {
                println!("  {} {}", "✓".green(), path.display());
            }
            Ok(())
        }

        Commands::Mml { json } => {
            let command = MmlCommand::from_json(&json)?;
            println!("{}", command.to_hex()?);
            Ok(())
        }
    }
}

/// Run a suite end to end; an error when any test case failed
async fn run_suite(suite_path: &Path, config_path: Option<&Path>, only: &[String]) -> Result<()> {
    let config = Config::resolve(config_path)?;
    let suite = Suite::load(suite_path)?;
    let cases = suite.select(only)?;

    let run_dir = paths::create_run_dir(&config.automation.reports_dir, Local::now())?;
    let step_log = StepLog::new();
    let _guards = logging::init_run(
        &run_dir,
        &config.automation.log_level,
        Arc::clone(&step_log),
    )?;
    info!("Reports for this run: {}", run_dir.display());

    let gateway = build_gateway(&config)?;
    let mut env = ScenarioEnv::new(config.clone(), Arc::clone(&step_log))
        .with_catalog(load_optional(&config.automation.api_file, "API table", ApiCatalog::load)?)
        .with_expectations(load_optional(
            &config.automation.expected_file,
            "Expected values",
            ExpectationTable::load,
        )?);
    if let Some(gateway) = &gateway {
        env = env.with_gateway(gateway.clone());
    }
    if config.alg.domain_name.is_empty() {
        warn!("[alg] domain_name is not configured, REST steps will fail");
    } else {
        env = env.with_client(AlgClient::new(&config)?);
    }

    let mut runner = TestRunner::new(&run_dir, step_log)?;
    if let Some(gateway) = gateway {
        runner = runner.with_gateway(gateway);
    }

    if let Some(name) = &suite.name {
        println!("{} {} ({} test cases)", "Suite:".cyan().bold(), name, cases.len());
    }
    for case in cases {
        let test_dir = runner.test_dir(&case.id);
        runner
            .run(&case.id, &case.description, || env.run_case(case, test_dir))
            .await;
    }

    let summary = runner.summarize();
    runner.write_report(&summary, config.automation.html_template.as_deref())?;

    if summary.all_passed() {
        Ok(())
    } else {
        Err(Error::assertion(format!(
            "{} of {} test cases failed",
            summary.failed, summary.total
        )))
    }
}

fn build_gateway(config: &Config) -> Result<Option<Gateway>> {
    if !config.alg.remote.is_configured() {
        warn!("[alg] host is not configured, ALG status and log collection are skipped");
        return Ok(None);
    }
    let shell = connect("alg", &config.alg.remote, &config.timeouts)?;
    Ok(Some(Gateway::new(shell, config.alg.clone())))
}

/// Load a declarative table, or start empty when the file does not exist
fn load_optional<T: Default>(path: &Path, what: &str, load: fn(&Path) -> Result<T>) -> Result<T> {
    if path.exists() {
        load(path)
    } else {
        warn!("{} {} not found, continuing without it", what, path.display());
        Ok(T::default())
    }
}

fn print_verdict(verdict: Verdict) {
    match verdict {
        Verdict::Pass => println!("{}", "PASS".green().bold()),
        Verdict::Fail => println!("{}", "FAIL".red().bold()),
    }
}
