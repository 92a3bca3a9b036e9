//! ALG harness - end-to-end validation of the ALG gateway
//!
//! Drives the NE and NEM simulators as remote processes, talks to the
//! gateway over mutually authenticated REST, and turns gateway logs and
//! metrics into PASS/FAIL verdicts recorded per test case and step.

pub mod api;
pub mod cli;
pub mod commands;
pub mod common;
pub mod mml;
pub mod oracle;
pub mod remote;
pub mod report;
pub mod simconfig;
pub mod steplog;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result, Verdict};
