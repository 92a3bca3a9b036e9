//! End-to-end suite run against local stand-ins
//!
//! The NE and NEM simulators are local shell processes and the gateway log
//! query reads a fixture, so the whole orchestration path runs without any
//! remote host:
//! 1. start NE and NEM, observe, stop both (the second stop is a no-op)
//! 2. fetch the gateway log for the window
//! 3. require "Established 1 connections" exactly once

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alg_harness::common::config::Config;
use alg_harness::remote::{connect, Gateway};
use alg_harness::steplog::StepLog;
use alg_harness::testing::{ScenarioEnv, Suite, TestRunner};
use alg_harness::Verdict;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn local_config(workdir: &Path, gateway_log: &Path) -> Config {
    let toml = format!(
        r#"
[automation]
observation_secs = 1

[alg]
transport = "local"
status_command = "echo 'Active: active (running)'"
log_command = "cat '{log}'"

[ne]
transport = "local"
start_path = "{dir}"
start_command = "sh -c 'echo NE simulator listening; sleep 5'"

[nem]
transport = "local"
start_path = "{dir}"
start_command = "sh -c 'echo NEM simulator connected; sleep 5'"
"#,
        log = gateway_log.display(),
        dir = workdir.display()
    );
    Config::parse(&toml).unwrap()
}

struct Outcome {
    verdict: Verdict,
    run_dir: tempfile::TempDir,
    step_log: Arc<StepLog>,
}

async fn run_against(fixture: &str) -> Outcome {
    let run_dir = tempfile::tempdir().unwrap();
    let config = local_config(run_dir.path(), &fixtures_dir().join("alg_logs").join(fixture));
    let suite = Suite::load(&fixtures_dir().join("e2e_suite.yaml")).unwrap();
    let case = &suite.cases[0];

    let step_log = StepLog::new();
    let gateway = Gateway::new(
        connect("alg", &config.alg.remote, &config.timeouts).unwrap(),
        config.alg.clone(),
    );
    let env = ScenarioEnv::new(config, Arc::clone(&step_log)).with_gateway(gateway.clone());
    let mut runner = TestRunner::new(run_dir.path(), Arc::clone(&step_log))
        .unwrap()
        .with_gateway(gateway);

    let test_dir = runner.test_dir(&case.id);
    let verdict = runner
        .run(&case.id, &case.description, || env.run_case(case, test_dir))
        .await;
    let summary = runner.summarize();
    runner.write_report(&summary, None).unwrap();

    Outcome {
        verdict,
        run_dir,
        step_log,
    }
}

#[tokio::test]
async fn test_single_connection_passes() {
    let outcome = run_against("established_once.log").await;
    assert_eq!(outcome.verdict, Verdict::Pass);

    let test_dir = outcome.run_dir.path().join("TC_E2E_001");
    let ne_log = std::fs::read_to_string(test_dir.join("NE_server.log")).unwrap();
    let nem_log = std::fs::read_to_string(test_dir.join("NEM_server.log")).unwrap();
    assert!(ne_log.contains("NE simulator listening"));
    assert!(nem_log.contains("NEM simulator connected"));

    let alg_log = std::fs::read_to_string(test_dir.join("ALG.log")).unwrap();
    assert_eq!(
        alg_log,
        std::fs::read_to_string(fixtures_dir().join("alg_logs/established_once.log")).unwrap()
    );

    let case = outcome.step_log.snapshot().remove(0);
    assert_eq!(case.steps.len(), 9);
    assert!(case.steps.iter().all(|s| s.status == Some(Verdict::Pass)));

    let csv = std::fs::read_to_string(outcome.run_dir.path().join("Reports.csv")).unwrap();
    assert!(csv.contains("TC_E2E_001,PASS,"));
    assert!(csv.contains("Total Tests,1,Pass: 1,Fail: 0,"));
}

#[tokio::test]
async fn test_missing_connection_fails() {
    let outcome = run_against("established_none.log").await;
    assert_eq!(outcome.verdict, Verdict::Fail);

    let case = outcome.step_log.snapshot().remove(0);
    let last = case.steps.last().unwrap();
    assert!(last.title.starts_with("Search 'Established 1 connections'"));
    assert_eq!(last.status, Some(Verdict::Fail));
}

#[tokio::test]
async fn test_duplicate_connection_fails() {
    let outcome = run_against("established_twice.log").await;
    assert_eq!(outcome.verdict, Verdict::Fail);

    let csv = std::fs::read_to_string(outcome.run_dir.path().join("Reports.csv")).unwrap();
    assert!(csv.contains("TC_E2E_001,FAIL,"));

    let html = std::fs::read_to_string(outcome.run_dir.path().join("Automation.html")).unwrap();
    assert!(html.contains(r#"<span class="chip fail">FAIL</span>"#));
}
