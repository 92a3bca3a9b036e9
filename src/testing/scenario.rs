//! Interpreter for suite test cases
//!
//! [`ScenarioEnv::run_case`] is the test body handed to the orchestrator.
//! Each step runs inside its own step scope; simulators still running when
//! the case ends are stopped before it returns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use colored::Colorize;
use tracing::{debug, info, warn};

use super::config::{Action, SimulatorRole, TestCase};
use crate::api::{AlgClient, ApiCatalog};
use crate::common::config::{Config, SimulatorConfig};
use crate::common::paths::{simulator_log_file, GATEWAY_LOG_FILE};
use crate::common::{Error, Result, Verdict};
use crate::oracle::{compare_diff, format_metrics_table, search_occurrences, ExpectationTable, MetricsSnapshot};
use crate::remote::{connect, Gateway, RemoteProcess};
use crate::steplog::StepLog;

/// Everything a test case may reach, shared across the whole run
#[derive(Debug)]
pub struct ScenarioEnv {
    config: Config,
    step_log: Arc<StepLog>,
    gateway: Option<Gateway>,
    client: Option<AlgClient>,
    catalog: ApiCatalog,
    expectations: ExpectationTable,
}

/// Per-case state: running simulators, collected snapshots, the window start
struct CaseState {
    test_id: String,
    test_dir: PathBuf,
    started_at: DateTime<Local>,
    simulators: HashMap<SimulatorRole, RemoteProcess>,
    snapshots: HashMap<String, MetricsSnapshot>,
}

impl CaseState {
    fn new(test_id: &str, test_dir: PathBuf) -> Self {
        Self {
            test_id: test_id.to_string(),
            test_dir,
            started_at: Local::now(),
            simulators: HashMap::new(),
            snapshots: HashMap::new(),
        }
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_relative() {
            self.test_dir.join(file)
        } else {
            file.to_path_buf()
        }
    }

    /// Simulator configs are given relative to the working directory,
    /// or to the test directory when generated there
    fn resolve_config(&self, file: &Path) -> PathBuf {
        let in_test_dir = self.test_dir.join(file);
        if file.is_relative() && !file.exists() && in_test_dir.exists() {
            in_test_dir
        } else {
            file.to_path_buf()
        }
    }

    async fn stop_simulators(&mut self) {
        for process in self.simulators.values_mut() {
            process.stop().await;
        }
    }
}

impl ScenarioEnv {
    pub fn new(config: Config, step_log: Arc<StepLog>) -> Self {
        Self {
            config,
            step_log,
            gateway: None,
            client: None,
            catalog: ApiCatalog::default(),
            expectations: ExpectationTable::default(),
        }
    }

    pub fn with_gateway(mut self, gateway: Gateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_client(mut self, client: AlgClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_catalog(mut self, catalog: ApiCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_expectations(mut self, expectations: ExpectationTable) -> Self {
        self.expectations = expectations;
        self
    }

    /// Run every step of `case`, stopping at the first failure
    pub async fn run_case(&self, case: &TestCase, test_dir: PathBuf) -> Result<()> {
        let mut state = CaseState::new(&case.id, test_dir);
        let result = self.run_steps(case, &mut state).await;
        state.stop_simulators().await;
        result
    }

    async fn run_steps(&self, case: &TestCase, state: &mut CaseState) -> Result<()> {
        for (index, step) in case.steps.iter().enumerate() {
            let title = step.title();
            let outcome = self
                .step_log
                .step(title.clone(), self.execute(&step.action, state))
                .await;
            match &outcome {
                Ok(()) => println!("  {} Step {}: {}", "✓".green(), index + 1, title.dimmed()),
                Err(e) => println!("  {} Step {}: {} ({})", "✗".red(), index + 1, title, e),
            }
            outcome?;
        }
        Ok(())
    }

    async fn execute(&self, action: &Action, state: &mut CaseState) -> Result<()> {
        match action {
            Action::StartSimulator { simulator, config } => {
                self.start_simulator(*simulator, config.as_deref(), state).await
            }
            Action::StopSimulator { simulator } => {
                match state.simulators.get_mut(simulator) {
                    Some(process) => process.stop().await,
                    None => warn!("{} simulator was never started", simulator.name()),
                }
                Ok(())
            }
            Action::Wait { seconds } => {
                let seconds = seconds.unwrap_or(self.config.automation.observation_secs as f64);
                let window = Duration::try_from_secs_f64(seconds)
                    .map_err(|e| Error::Config(format!("Invalid wait of {seconds}s: {e}")))?;
                info!("Waiting {:.1}s", window.as_secs_f64());
                tokio::time::sleep(window).await;
                Ok(())
            }
            Action::CollectMetrics { label } => {
                let snapshot = self
                    .client()?
                    .metrics(&self.catalog)
                    .await
                    .ok_or_else(|| Error::assertion("No metrics returned from ALG Server"))?;
                info!("Collected {} metrics as '{}'", snapshot.len(), label);
                debug!("\n{}", format_metrics_table(&snapshot));
                state.snapshots.insert(label.clone(), snapshot);
                Ok(())
            }
            Action::CompareMetrics {
                initial,
                final_,
                test_id,
            } => {
                let test_id = test_id.as_deref().unwrap_or(&state.test_id);
                let before = snapshot(state, initial)?;
                let after = snapshot(state, final_)?;
                compare_diff(before, after, test_id, &self.expectations)?
                    .verdict
                    .into_result(format!("Metrics delta mismatch for {test_id}"))
            }
            Action::FetchGatewayLogs => {
                let dest = state.test_dir.join(GATEWAY_LOG_FILE);
                self.gateway()?.fetch_logs(state.started_at, None, &dest).await
            }
            Action::SearchLog {
                file,
                pattern,
                count,
                regex,
            } => {
                let path = state.resolve(file);
                let outcome = search_occurrences(&path, pattern, *count, *regex)?;
                let expected = match count {
                    Some(n) => format!("{n}"),
                    None => "at least 1".to_string(),
                };
                outcome.verdict.into_result(format!(
                    "'{}' found {} times in {}, expected {}",
                    pattern,
                    outcome.count,
                    path.display(),
                    expected
                ))
            }
            Action::TriggerApi { api, expect_status } => {
                let response = self.client()?.trigger(&self.catalog, api).await;
                match (expect_status, response.status) {
                    (_, None) => Err(Error::assertion(format!("No response from ALG Server for {api}"))),
                    (Some(expected), Some(status)) => Verdict::from_bool(*expected == status)
                        .into_result(format!("{api} returned {status}, expected {expected}")),
                    (None, Some(_)) => Ok(()),
                }
            }
            Action::ValidateApi { api, expected } => {
                self.client()?
                    .validate(&self.catalog, &self.expectations, api, expected)
                    .await
            }
            Action::PatchGatewayConfig { updates } => self.gateway()?.patch_config(updates).await,
            Action::GatewayStatus { expect_active } => {
                let active = self.gateway()?.is_active().await;
                Verdict::from_bool(active == *expect_active).into_result(format!(
                    "ALG active = {active}, expected {expect_active}"
                ))
            }
        }
    }

    async fn start_simulator(
        &self,
        role: SimulatorRole,
        local_config: Option<&Path>,
        state: &mut CaseState,
    ) -> Result<()> {
        if state.simulators.get(&role).is_some_and(RemoteProcess::is_running) {
            warn!("{} simulator is already running", role.name());
            return Ok(());
        }

        let settings = self.simulator(role);
        if settings.start_command.is_empty() {
            return Err(Error::missing_config(role.section(), "start_command"));
        }
        let shell = connect(role.section(), &settings.remote, &self.config.timeouts)?;
        let mut process = RemoteProcess::new(
            role.name(),
            shell,
            settings.start_path.clone(),
            settings.start_command.clone(),
            simulator_log_file(&state.test_dir, role.name()),
        );

        let local_config = local_config.map(|p| state.resolve_config(p));
        process
            .apply_config(local_config.as_deref(), &settings.remote_config_path())
            .await;
        process.start().await?;
        state.simulators.insert(role, process);
        Ok(())
    }

    fn simulator(&self, role: SimulatorRole) -> &SimulatorConfig {
        match role {
            SimulatorRole::Ne => &self.config.ne,
            SimulatorRole::Nem => &self.config.nem,
        }
    }

    fn gateway(&self) -> Result<&Gateway> {
        self.gateway
            .as_ref()
            .ok_or_else(|| Error::missing_config("alg", "host"))
    }

    fn client(&self) -> Result<&AlgClient> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::missing_config("alg", "domain_name"))
    }
}

fn snapshot<'a>(state: &'a CaseState, label: &str) -> Result<&'a MetricsSnapshot> {
    state
        .snapshots
        .get(label)
        .ok_or_else(|| Error::Config(format!("No metrics collected under '{label}'")))
}
