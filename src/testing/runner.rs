//! Test case orchestration
//!
//! [`TestRunner::run`] executes one test body, turns whatever it does into
//! a PASS/FAIL verdict and appends exactly one ledger row. It never returns
//! an error and never unwinds, so a failing test case cannot stop the run.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use colored::Colorize;
use futures_util::FutureExt;
use tracing::{error, info};

use super::ledger::{Ledger, LedgerEntry, RunSummary};
use crate::common::error::error_chain;
use crate::common::paths::{self, GATEWAY_LOG_FILE, HTML_REPORT_FILE, JSON_LOG_FILE, LEDGER_FILE, TEXT_LOG_FILE};
use crate::common::{format_elapsed, Error, Result, Verdict};
use crate::remote::Gateway;
use crate::report::ReportSynthesizer;
use crate::steplog::StepLog;

/// Runs test cases one after another inside a run directory
#[derive(Debug)]
pub struct TestRunner {
    run_dir: PathBuf,
    step_log: Arc<StepLog>,
    gateway: Option<Gateway>,
    ledger: Ledger,
    started: Instant,
}

impl TestRunner {
    /// Start a run in `run_dir`; the ledger file is created right away
    pub fn new(run_dir: impl Into<PathBuf>, step_log: Arc<StepLog>) -> Result<Self> {
        let run_dir = run_dir.into();
        let ledger = Ledger::create(run_dir.join(LEDGER_FILE))?;
        Ok(Self {
            run_dir,
            step_log,
            gateway: None,
            ledger,
            started: Instant::now(),
        })
    }

    /// Check gateway health around each test case and collect its logs
    pub fn with_gateway(mut self, gateway: Gateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn step_log(&self) -> &Arc<StepLog> {
        &self.step_log
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Output directory of a test case
    pub fn test_dir(&self, id: &str) -> PathBuf {
        paths::test_dir(&self.run_dir, id)
    }

    /// Execute `body` as test case `id`.
    ///
    /// `Ok` is PASS. An assertion error, any other error and a panic are
    /// all FAIL; only the message detail in the log differs.
    pub async fn run<F, Fut>(&mut self, id: &str, description: &str, body: F) -> Verdict
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        println!("\n{} {}", "Running Test:".blue().bold(), id.white().bold());
        if !description.is_empty() {
            println!("  {}", description.dimmed());
        }
        info!(" ----- Starting Test execution - [{}] -------", id);

        let dir_ready = paths::create_test_dir(&self.run_dir, id);
        self.log_gateway_status().await;

        let started = Instant::now();
        let window_start = Local::now();
        self.step_log.start_test_case(id, description);
        info!("[{}] - {}", id, description);

        let outcome = match dir_ready {
            Ok(_) => AssertUnwindSafe(async move { body().await }).catch_unwind().await,
            Err(e) => Ok(Err(Error::Io(e))),
        };
        let verdict = classify(outcome);

        if let Some(gateway) = &self.gateway {
            let dest = self.test_dir(id).join(GATEWAY_LOG_FILE);
            if let Err(e) = gateway.fetch_logs(window_start, Some(Local::now()), &dest).await {
                error!("Failed to retrieve ALG logs for {}: {}", id, e);
            }
        }
        self.log_gateway_status().await;

        self.step_log.end_test_case(id, verdict);
        let elapsed = started.elapsed();
        info!(
            " ----- Test execution Completed - [{}] : Status - [{}] -------",
            id, verdict
        );

        let entry = LedgerEntry {
            id: id.to_string(),
            verdict,
            elapsed,
        };
        if let Err(e) = self.ledger.record(entry) {
            error!("Failed to append {} to the ledger: {}", id, e);
        }

        match verdict {
            Verdict::Pass => println!(
                "  {} {} ({})",
                "✓".green().bold(),
                "PASS".green().bold(),
                format_elapsed(elapsed)
            ),
            Verdict::Fail => println!(
                "  {} {} ({})",
                "✗".red().bold(),
                "FAIL".red().bold(),
                format_elapsed(elapsed)
            ),
        }
        verdict
    }

    async fn log_gateway_status(&self) {
        if let Some(gateway) = &self.gateway {
            info!("ALG Status: {}", gateway.is_active().await);
        }
    }

    /// Totals of the run so far; writes the ledger trailer and prints the
    /// final result table
    pub fn summarize(&self) -> RunSummary {
        info!(" ---- Test Suite execution completed ----- ");
        let summary = RunSummary::from_entries(self.ledger.entries(), self.started.elapsed());
        if let Err(e) = self.ledger.write_trailer(&summary) {
            error!("Failed to write the ledger summary: {}", e);
        }
        info!(
            "Total: {} | Passed: {} | Failed: {} | Duration: {:.2}s",
            summary.total,
            summary.passed,
            summary.failed,
            summary.elapsed.as_secs_f64()
        );
        self.print_summary(&summary);
        summary
    }

    fn print_summary(&self, summary: &RunSummary) {
        let rule = "-".repeat(80);
        let artifact = |name: &str| self.run_dir.join(name).display().to_string();
        let failed = format!("{:<12}", format!("Failed: {}", summary.failed));

        println!("\n{rule}");
        println!("|{}|", format!("{:^78}", "Final Result").bold());
        println!("{rule}");
        println!(
            "| {:<12} | {:<12} | {} | {:<31} |",
            format!("Total: {}", summary.total),
            format!("Passed: {}", summary.passed),
            if summary.failed > 0 { failed.red() } else { failed.green() },
            format!("Duration: {:.2}s", summary.elapsed.as_secs_f64())
        );
        println!("{rule}");
        for (label, file) in [
            ("Report", LEDGER_FILE),
            ("Automation (JSON)", JSON_LOG_FILE),
            ("Automation (Log)", TEXT_LOG_FILE),
            ("Automation (HTML)", HTML_REPORT_FILE),
        ] {
            println!("| {:<18} | {:<55} |", label, artifact(file));
        }
        println!("{rule}");
    }

    /// Render `Automation.html` into the run directory
    pub fn write_report(&self, summary: &RunSummary, template: Option<&Path>) -> Result<PathBuf> {
        let dest = self.run_dir.join(HTML_REPORT_FILE);
        ReportSynthesizer::new(&self.step_log, self.ledger.entries(), *summary).write(&dest, template)?;
        Ok(dest)
    }
}

fn classify(outcome: std::result::Result<Result<()>, Box<dyn Any + Send>>) -> Verdict {
    match outcome {
        Ok(Ok(())) => Verdict::Pass,
        Ok(Err(e)) if e.is_assertion() => {
            error!("[Assertion Failure]: {}", e);
            Verdict::Fail
        }
        Ok(Err(e)) => {
            error!("[Exception]: {}", error_chain(&e));
            Verdict::Fail
        }
        Err(payload) => {
            error!("[Exception]: test body panicked: {}", panic_message(payload.as_ref()));
            Verdict::Fail
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::{AlgConfig, Timeouts};
    use crate::remote::LocalShell;

    fn runner(dir: &Path) -> TestRunner {
        TestRunner::new(dir, StepLog::new()).unwrap()
    }

    async fn passes() -> Result<()> {
        Ok(())
    }

    async fn asserts() -> Result<()> {
        Err(Error::assertion("count 0 != 1"))
    }

    async fn errors() -> Result<()> {
        Err(Error::Internal("boom".into()))
    }

    async fn panics() -> Result<()> {
        panic!("body bug")
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn test_every_outcome_records_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = runner(dir.path());

        assert_eq!(runner.run("TC_pass", "passes", passes).await, Verdict::Pass);
        assert_eq!(runner.run("TC_assert", "asserts", asserts).await, Verdict::Fail);
        assert_eq!(runner.run("TC_error", "errors", errors).await, Verdict::Fail);
        assert_eq!(runner.run("TC_panic", "panics", panics).await, Verdict::Fail);

        let ids: Vec<_> = runner.ledger().entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["TC_pass", "TC_assert", "TC_error", "TC_panic"]);
        for id in ids {
            assert!(dir.path().join(id).is_dir());
        }

        let cases = runner.step_log().snapshot();
        assert_eq!(cases.len(), 4);
        assert_eq!(cases[0].status, Some(Verdict::Pass));
        assert!(cases[1..].iter().all(|c| c.status == Some(Verdict::Fail)));
    }

    #[tokio::test]
    async fn test_panic_inside_step_closes_it_as_fail() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = runner(dir.path());
        let log = Arc::clone(runner.step_log());

        let verdict = runner
            .run("TC_1", "panics in a step", || async move {
                let _guard = log.begin_step("Explode");
                if log.current_step_title().is_some() {
                    panic!("inside step");
                }
                Ok::<(), Error>(())
            })
            .await;
        assert_eq!(verdict, Verdict::Fail);

        let case = runner.step_log().snapshot().remove(0);
        assert_eq!(case.steps[0].status, Some(Verdict::Fail));
        assert_eq!(runner.step_log().current_step_title(), None);
    }

    #[tokio::test]
    async fn test_gateway_logs_fetched_for_each_case() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Gateway::new(
            Arc::new(LocalShell::new(&Timeouts::default())),
            AlgConfig {
                status_command: "echo 'Active: active (running)'".into(),
                log_command: "echo 'window {since} .. {until}'".into(),
                ..AlgConfig::default()
            },
        );
        let mut runner = runner(dir.path()).with_gateway(gateway);

        runner.run("TC_1", "fails", asserts).await;
        let logs = std::fs::read_to_string(dir.path().join("TC_1").join(GATEWAY_LOG_FILE)).unwrap();
        assert!(logs.starts_with("window "));
    }

    #[tokio::test]
    async fn test_summarize_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = runner(dir.path());
        runner.run("TC_1", "ok", passes).await;
        runner.run("TC_2", "bad", asserts).await;

        let summary = runner.summarize();
        assert_eq!((summary.total, summary.passed, summary.failed), (2, 1, 1));

        let csv = std::fs::read_to_string(dir.path().join(LEDGER_FILE)).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "Test ID,Result,Execution Time (s)");
        assert!(lines[1].starts_with("TC_1,PASS,"));
        assert!(lines[2].starts_with("TC_2,FAIL,"));
        assert_eq!(lines[3], "");
        assert!(lines[4].starts_with("Total Tests,2,Pass: 1,Fail: 1,Total Time: "));

        let report = runner.write_report(&summary, None).unwrap();
        let html = std::fs::read_to_string(report).unwrap();
        assert!(html.contains(r##"href="#testcase-TC_2""##));
    }
}
