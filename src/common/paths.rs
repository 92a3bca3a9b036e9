//! Configuration and report paths
//!
//! Every run writes into its own `report-<timestamp>` directory; each test
//! case gets a sub-directory named after its id.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Name used for the configuration directory
const APP_NAME: &str = "alg-harness";

/// Tabular ledger
pub const LEDGER_FILE: &str = "Reports.csv";
/// Plain text log of the whole run
pub const TEXT_LOG_FILE: &str = "Automation.log";
/// Line-delimited JSON log of the whole run
pub const JSON_LOG_FILE: &str = "Automation.json";
/// Nested collapsible HTML report
pub const HTML_REPORT_FILE: &str = "Automation.html";

/// Gateway log captured for a test window
pub const GATEWAY_LOG_FILE: &str = "ALG.log";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/alg-harness/`
/// - macOS: `~/Library/Application Support/alg-harness/`
/// - Windows: `%APPDATA%\alg-harness\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Create `<base>/report-YYYYMMDDHHMMSS` for a run started at `now`
pub fn create_run_dir(base: &Path, now: DateTime<Local>) -> io::Result<PathBuf> {
    let dir = base.join(format!("report-{}", now.format("%Y%m%d%H%M%S")));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Create the isolated output directory of one test case
pub fn create_test_dir(run_dir: &Path, test_id: &str) -> io::Result<PathBuf> {
    let dir = test_dir(run_dir, test_id);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Output directory of one test case (not created)
pub fn test_dir(run_dir: &Path, test_id: &str) -> PathBuf {
    run_dir.join(test_id)
}

/// Console capture of a simulator, e.g. `NE_server.log`
pub fn simulator_log_file(test_dir: &Path, simulator: &str) -> PathBuf {
    test_dir.join(format!("{simulator}_server.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_config_dir_is_valid() {
        let dir = config_dir();
        assert!(dir.is_some());
    }

    #[test]
    fn test_run_and_test_dirs() {
        let base = tempfile::tempdir().unwrap();
        let now = Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();

        let run = create_run_dir(base.path(), now).unwrap();
        assert_eq!(run.file_name().unwrap(), "report-20250309140507");
        assert!(run.is_dir());

        let test = create_test_dir(&run, "DTAL-291").unwrap();
        assert!(test.is_dir());
        assert_eq!(
            simulator_log_file(&test, "NEM"),
            run.join("DTAL-291").join("NEM_server.log")
        );
    }
}
