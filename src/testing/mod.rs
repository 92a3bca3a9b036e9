//! Test execution
//!
//! [`TestRunner`] runs test bodies and keeps the ledger; suites loaded from
//! YAML are turned into test bodies by [`ScenarioEnv`].

mod config;
mod ledger;
mod runner;
mod scenario;

pub use config::{Action, SimulatorRole, StepSpec, Suite, TestCase};
pub use ledger::{Ledger, LedgerEntry, RunSummary};
pub use runner::TestRunner;
pub use scenario::ScenarioEnv;
