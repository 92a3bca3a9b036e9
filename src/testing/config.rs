//! Test suite definitions
//!
//! A suite is a YAML file listing test cases; each case is a sequence of
//! titled steps with a tagged `action`.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::common::{Error, Result};

/// A complete suite loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct Suite {
    /// Optional suite name shown in the console
    #[serde(default)]
    pub name: Option<String>,
    pub cases: Vec<TestCase>,
}

/// One test case: an id, what it verifies, and the steps that verify it
#[derive(Deserialize, Debug, Clone)]
pub struct TestCase {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

/// One step; the title defaults to a description of the action
#[derive(Deserialize, Debug, Clone)]
pub struct StepSpec {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub action: Action,
}

impl StepSpec {
    pub fn title(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.action.to_string())
    }
}

/// Which simulator a step addresses
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SimulatorRole {
    Ne,
    Nem,
}

impl SimulatorRole {
    /// Label used in logs and sink file names
    pub fn name(self) -> &'static str {
        match self {
            Self::Ne => "NE",
            Self::Nem => "NEM",
        }
    }

    /// Config file section
    pub fn section(self) -> &'static str {
        match self {
            Self::Ne => "ne",
            Self::Nem => "nem",
        }
    }
}

fn default_initial() -> String {
    "initial".to_string()
}

fn default_final() -> String {
    "final".to_string()
}

fn default_true() -> bool {
    true
}

/// What a step does
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Push an optional config file to the simulator host and start it
    StartSimulator {
        simulator: SimulatorRole,
        #[serde(default)]
        config: Option<PathBuf>,
    },
    StopSimulator {
        simulator: SimulatorRole,
    },
    /// Sleep for the observation window (configured default when omitted)
    Wait {
        #[serde(default)]
        seconds: Option<f64>,
    },
    /// Snapshot the gateway metrics under `label`
    CollectMetrics {
        #[serde(default = "default_initial")]
        label: String,
    },
    /// Compare two snapshots against the expected deltas of `test_id`
    /// (the running test case when omitted)
    CompareMetrics {
        #[serde(default = "default_initial")]
        initial: String,
        #[serde(default = "default_final", rename = "final")]
        final_: String,
        #[serde(default)]
        test_id: Option<String>,
    },
    /// Gateway log since the test case started, into `ALG.log`
    FetchGatewayLogs,
    /// Count `pattern` in `file` (relative paths resolve in the test directory)
    SearchLog {
        file: PathBuf,
        pattern: String,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        regex: bool,
    },
    TriggerApi {
        api: String,
        #[serde(default)]
        expect_status: Option<u16>,
    },
    /// Require the body of `api` to match `expected` in the expectation table
    ValidateApi {
        api: String,
        expected: String,
    },
    PatchGatewayConfig {
        updates: Map<String, Value>,
    },
    GatewayStatus {
        #[serde(default = "default_true")]
        expect_active: bool,
    },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartSimulator { simulator, .. } => write!(f, "Start {} simulator", simulator.name()),
            Self::StopSimulator { simulator } => write!(f, "Stop {} simulator", simulator.name()),
            Self::Wait { seconds: Some(s) } => write!(f, "Wait {s}s"),
            Self::Wait { seconds: None } => f.write_str("Wait for the observation window"),
            Self::CollectMetrics { label } => write!(f, "Collect {label} metrics"),
            Self::CompareMetrics { initial, final_, .. } => {
                write!(f, "Compare metrics {initial} -> {final_}")
            }
            Self::FetchGatewayLogs => f.write_str("Fetch ALG logs"),
            Self::SearchLog { file, pattern, .. } => {
                write!(f, "Search '{}' in {}", pattern, file.display())
            }
            Self::TriggerApi { api, .. } => write!(f, "Trigger API {api}"),
            Self::ValidateApi { api, expected } => write!(f, "Validate API {api} against {expected}"),
            Self::PatchGatewayConfig { .. } => f.write_str("Patch ALG config"),
            Self::GatewayStatus { .. } => f.write_str("Check ALG status"),
        }
    }
}

impl Suite {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Invalid suite '{}': {}", path.display(), e)))
    }

    /// Parse a suite; test case ids must be unique
    pub fn parse(content: &str) -> Result<Self> {
        let suite: Suite = serde_yaml::from_str(content)?;
        let mut seen = HashSet::new();
        for case in &suite.cases {
            if !seen.insert(case.id.as_str()) {
                return Err(Error::Config(format!("Duplicate test case id '{}'", case.id)));
            }
        }
        Ok(suite)
    }

    /// Cases to run, in suite order; everything when `only` is empty.
    ///
    /// An id in `only` that the suite does not define is an error.
    pub fn select(&self, only: &[String]) -> Result<Vec<&TestCase>> {
        if only.is_empty() {
            return Ok(self.cases.iter().collect());
        }
        if let Some(unknown) = only.iter().find(|id| !self.cases.iter().any(|c| &c.id == *id)) {
            return Err(Error::Config(format!("Unknown test case id '{unknown}'")));
        }
        Ok(self
            .cases
            .iter()
            .filter(|c| only.contains(&c.id))
            .collect())
    }
}
