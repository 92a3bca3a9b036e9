//! One-shot operations against the gateway host

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use super::shell::Shell;
use crate::common::config::AlgConfig;
use crate::common::{Error, Result};

/// Marker line of a healthy unit in `systemctl status` output
const ACTIVE_MARKER: &str = "Active: active (running)";

/// Scratch copy used while patching the gateway config
const STAGING_PATH: &str = "/tmp/alg-config.json";

/// Format understood by `journalctl --since/--until`
pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct Gateway {
    shell: Arc<dyn Shell>,
    config: AlgConfig,
}

impl Gateway {
    pub fn new(shell: Arc<dyn Shell>, config: AlgConfig) -> Self {
        Self { shell, config }
    }

    fn render(&self, template: &str, since: Option<&str>, until: Option<&str>) -> String {
        let mut command = template.replace("{service}", &self.config.service);
        if let Some(since) = since {
            command = command.replace("{since}", since);
        }
        if let Some(until) = until {
            command = command.replace("{until}", until);
        }
        command
    }

    /// Whether the gateway service reports itself as running.
    ///
    /// Errors are logged and reported as inactive.
    pub async fn is_active(&self) -> bool {
        info!("Checking ALG service status");
        let command = self.render(&self.config.status_command, None, None);
        match self.shell.exec(&command).await {
            Ok(output) if output.stdout.contains(ACTIVE_MARKER) => {
                info!("ALG service is active (running)");
                true
            }
            Ok(output) => {
                warn!("ALG service is NOT active (running). Output:\n{}", output.stdout);
                false
            }
            Err(e) => {
                error!("Failed to check ALG status: {}", e);
                false
            }
        }
    }

    /// Write the gateway log between `since` and `until` (now when absent)
    /// verbatim to `dest`
    pub async fn fetch_logs(
        &self,
        since: DateTime<Local>,
        until: Option<DateTime<Local>>,
        dest: &Path,
    ) -> Result<()> {
        info!("Retrieving ALG logs");
        let since = since.format(LOG_TIME_FORMAT).to_string();
        let until = until.unwrap_or_else(Local::now).format(LOG_TIME_FORMAT).to_string();
        let command = self.render(&self.config.log_command, Some(&since), Some(&until));
        info!("Running command: {}", command);

        let output = self.shell.exec_checked(&command).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, output.stdout).await?;
        info!("ALG logs retrieved to {}", dest.display());
        Ok(())
    }

    /// Merge `updates` into the top level of the gateway JSON config
    pub async fn patch_config(&self, updates: &Map<String, Value>) -> Result<()> {
        let config_path = shell_escape::escape(self.config.config_path.as_str().into());
        info!("Patching ALG config {}", self.config.config_path);

        self.shell
            .exec_checked(&format!(
                "sudo cp {config_path} {STAGING_PATH} && sudo chmod 666 {STAGING_PATH}"
            ))
            .await?;

        let workspace = tempfile::tempdir()?;
        let local = workspace.path().join("alg-config.json");
        self.shell.download(STAGING_PATH, &local).await?;

        let content = tokio::fs::read_to_string(&local)
            .await
            .map_err(|e| Error::file_read(&local, e))?;
        let merged = merge_top_level(&content, updates)?;
        tokio::fs::write(&local, merged).await?;

        self.shell.upload(&local, STAGING_PATH).await?;
        self.shell
            .exec_checked(&format!("sudo mv {STAGING_PATH} {config_path}"))
            .await?;

        info!("ALG config updated with keys: {:?}", updates.keys().collect::<Vec<_>>());
        Ok(())
    }
}

/// Insert or replace top-level keys of a JSON object document
fn merge_top_level(content: &str, updates: &Map<String, Value>) -> Result<String> {
    let mut document: Value = serde_json::from_str(content)?;
    let object = document
        .as_object_mut()
        .ok_or_else(|| Error::Config("ALG config is not a JSON object".to_string()))?;
    for (key, value) in updates {
        object.insert(key.clone(), value.clone());
    }
    Ok(serde_json::to_string_pretty(&document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::Timeouts;
    use crate::remote::shell::LocalShell;
    use chrono::TimeZone;
    use serde_json::json;

    fn gateway(status: &str, log: &str) -> Gateway {
        let config = AlgConfig {
            status_command: status.to_string(),
            log_command: log.to_string(),
            ..AlgConfig::default()
        };
        Gateway::new(Arc::new(LocalShell::new(&Timeouts::default())), config)
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let gw = gateway("", "");
        assert_eq!(
            gw.render(
                "journalctl -u {service} --since \"{since}\" --until \"{until}\"",
                Some("2025-01-01 10:00:00"),
                Some("2025-01-01 10:00:10"),
            ),
            "journalctl -u alggo --since \"2025-01-01 10:00:00\" --until \"2025-01-01 10:00:10\""
        );
    }

    #[tokio::test]
    async fn test_is_active() {
        assert!(gateway("echo '   Active: active (running) since Mon'", "").is_active().await);
        assert!(!gateway("echo '   Active: failed'", "").is_active().await);
    }

    #[tokio::test]
    async fn test_fetch_logs_writes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway("", "printf 'since={since}\\nline two\\n'");
        let since = Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        let dest = dir.path().join("T-1/ALG.log");

        gw.fetch_logs(since, None, &dest).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dest).unwrap(),
            "since=2025-03-09 14:05:07\nline two\n"
        );
    }

    #[tokio::test]
    async fn test_fetch_logs_command_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway("", "exit 1");
        let result = gw
            .fetch_logs(Local::now(), None, &dir.path().join("ALG.log"))
            .await;
        assert!(matches!(result, Err(Error::RemoteCommand { .. })));
    }

    #[test]
    fn test_merge_top_level() {
        let updates = json!({"log_level": "debug", "new": [1, 2]});
        let merged = merge_top_level(
            r#"{"log_level": "info", "keep": true}"#,
            updates.as_object().unwrap(),
        )
        .unwrap();
        let merged: Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(merged, json!({"log_level": "debug", "keep": true, "new": [1, 2]}));

        assert!(merge_top_level("[1]", updates.as_object().unwrap()).is_err());
    }
}
