//! Command execution on simulator and gateway hosts
//!
//! [`SshShell`] drives the system `ssh`/`scp` binaries; [`LocalShell`] runs
//! the same operations on this machine for co-located simulators.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::common::config::{HostConfig, Timeouts, Transport};
use crate::common::{Error, Result};

/// Captured result of a one-shot command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Operations the harness needs on a host
#[async_trait]
pub trait Shell: Send + Sync + fmt::Debug {
    /// Human-readable name of the host, used in errors and logs
    fn target(&self) -> &str;

    /// Check that a session can be established
    async fn probe(&self) -> Result<()>;

    /// Run a one-shot command and capture its output
    async fn exec(&self, command: &str) -> Result<CommandOutput>;

    /// Run a one-shot command and fail on a non-zero exit status
    async fn exec_checked(&self, command: &str) -> Result<CommandOutput> {
        let output = self.exec(command).await?;
        if !output.success() {
            return Err(Error::RemoteCommand {
                target: self.target().to_string(),
                command: command.to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Copy a local file to the host
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// Copy a file from the host
    async fn download(&self, remote: &str, local: &Path) -> Result<()>;

    /// Start `command` in `workdir` as a long-running session whose console
    /// output (stdout and stderr combined) is readable from the child's stdout
    fn spawn_session(&self, workdir: &str, command: &str) -> Result<Child>;
}

/// Build the shell for a configured host
pub fn connect(section: &str, host: &HostConfig, timeouts: &Timeouts) -> Result<Arc<dyn Shell>> {
    match host.transport {
        Transport::Local => Ok(Arc::new(LocalShell::new(timeouts))),
        Transport::Ssh => Ok(Arc::new(SshShell::new(section, host, timeouts)?)),
    }
}

/// `cd <dir> && <command>`, or just the command when no directory is set
fn session_command(workdir: &str, command: &str) -> String {
    if workdir.is_empty() {
        command.to_string()
    } else {
        format!("cd {} && {}", shell_escape::escape(workdir.into()), command)
    }
}

async fn collect(mut cmd: Command, target: &str, timeout_secs: u64) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| Error::Timeout(timeout_secs))?
        .map_err(|e| Error::connection_failed(target, e))?;

    Ok(CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Host reached through the system OpenSSH client
#[derive(Debug, Clone)]
pub struct SshShell {
    destination: String,
    port: u16,
    identity_file: Option<PathBuf>,
    ssh: PathBuf,
    scp: PathBuf,
    connect_secs: u64,
    command_secs: u64,
}

impl SshShell {
    pub fn new(section: &str, host: &HostConfig, timeouts: &Timeouts) -> Result<Self> {
        if host.host.is_empty() {
            return Err(Error::missing_config(section, "host"));
        }
        let ssh = which::which("ssh")
            .map_err(|_| Error::Config("ssh client not found in PATH".to_string()))?;
        let scp = which::which("scp")
            .map_err(|_| Error::Config("scp not found in PATH".to_string()))?;

        Ok(Self {
            destination: host.destination(),
            port: host.ssh_port,
            identity_file: host.identity_file.clone(),
            ssh,
            scp,
            connect_secs: timeouts.connect_secs,
            command_secs: timeouts.command_secs,
        })
    }

    fn common_options(&self, cmd: &mut Command) {
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("-o").arg("StrictHostKeyChecking=accept-new");
        cmd.arg("-o").arg(format!("ConnectTimeout={}", self.connect_secs));
        if let Some(identity) = &self.identity_file {
            cmd.arg("-i").arg(identity);
        }
    }

    fn ssh_command(&self) -> Command {
        let mut cmd = Command::new(&self.ssh);
        self.common_options(&mut cmd);
        cmd.arg("-p").arg(self.port.to_string());
        cmd
    }

    fn scp_command(&self) -> Command {
        let mut cmd = Command::new(&self.scp);
        self.common_options(&mut cmd);
        cmd.arg("-P").arg(self.port.to_string());
        cmd
    }

    fn remote_spec(&self, path: &str) -> String {
        format!("{}:{}", self.destination, path)
    }

    async fn transfer(&self, from: &str, to: &str, path: &str) -> Result<()> {
        let mut cmd = self.scp_command();
        cmd.arg(from).arg(to);
        let output = collect(cmd, &self.destination, self.command_secs).await?;
        if !output.success() {
            return Err(Error::TransferFailed {
                target: self.destination.clone(),
                path: path.to_string(),
                reason: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Shell for SshShell {
    fn target(&self) -> &str {
        &self.destination
    }

    async fn probe(&self) -> Result<()> {
        let mut cmd = self.ssh_command();
        cmd.arg(&self.destination).arg("true");
        let output = collect(cmd, &self.destination, self.connect_secs + 5).await?;
        // 255 is ssh's own failure code; anything else came from the remote side
        if output.status == Some(255) || output.status.is_none() {
            return Err(Error::connection_failed(
                &self.destination,
                output.stderr.trim(),
            ));
        }
        Ok(())
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        debug!(target_host = %self.destination, command, "ssh exec");
        let mut cmd = self.ssh_command();
        cmd.arg(&self.destination).arg(command);
        collect(cmd, &self.destination, self.command_secs).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let from = local.to_string_lossy();
        self.transfer(&from, &self.remote_spec(remote), remote).await
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let to = local.to_string_lossy();
        self.transfer(&self.remote_spec(remote), &to, remote).await
    }

    fn spawn_session(&self, workdir: &str, command: &str) -> Result<Child> {
        let mut cmd = self.ssh_command();
        // A pseudo-terminal makes the remote command die with the session
        cmd.arg("-tt")
            .arg(&self.destination)
            .arg(session_command(workdir, command))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        cmd.spawn().map_err(|e| Error::ProcessStartFailed {
            name: self.destination.clone(),
            reason: e.to_string(),
        })
    }
}

/// This machine, through `sh -c`
#[derive(Debug, Clone)]
pub struct LocalShell {
    command_secs: u64,
}

impl LocalShell {
    pub fn new(timeouts: &Timeouts) -> Self {
        Self {
            command_secs: timeouts.command_secs,
        }
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(from, to)
            .await
            .map_err(|e| Error::TransferFailed {
                target: "local".to_string(),
                path: from.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

#[async_trait]
impl Shell for LocalShell {
    fn target(&self) -> &str {
        "local"
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        collect(cmd, "local", self.command_secs).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        self.copy(local, Path::new(remote)).await
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        self.copy(Path::new(remote), local).await
    }

    fn spawn_session(&self, workdir: &str, command: &str) -> Result<Child> {
        // `exec` so that killing the child stops the command itself
        let script = format!("{} 2>&1", session_command(workdir, &format!("exec {command}")));
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ProcessStartFailed {
                name: "local".to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn local() -> LocalShell {
        LocalShell::new(&Timeouts::default())
    }

    #[test]
    fn test_session_command_escapes_workdir() {
        assert_eq!(session_command("", "./sim"), "./sim");
        assert_eq!(session_command("/opt/ne", "./sim -c x"), "cd /opt/ne && ./sim -c x");
        assert_eq!(
            session_command("/opt/my sims", "./sim"),
            "cd '/opt/my sims' && ./sim"
        );
    }

    #[test]
    fn test_ssh_requires_host() {
        let err = SshShell::new("ne", &HostConfig::default(), &Timeouts::default()).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: [ne] host is not configured");
    }

    #[tokio::test]
    async fn test_local_exec_and_checked() {
        let shell = local();
        let output = shell.exec("echo hello; echo oops >&2").await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");

        let err = shell.exec_checked("exit 3").await.unwrap_err();
        assert!(matches!(err, Error::RemoteCommand { status: Some(3), .. }));
    }

    #[tokio::test]
    async fn test_local_transfer_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("config.yaml");
        std::fs::write(&src, "a: 1\n").unwrap();

        let shell = local();
        let remote = dir.path().join("remote/config.yaml");
        shell.upload(&src, &remote.to_string_lossy()).await.unwrap();
        let back = dir.path().join("back.yaml");
        shell.download(&remote.to_string_lossy(), &back).await.unwrap();
        assert_eq!(std::fs::read_to_string(back).unwrap(), "a: 1\n");

        let missing = shell
            .download("/nonexistent/alg-harness/file", &dir.path().join("x"))
            .await;
        assert!(matches!(missing, Err(Error::TransferFailed { .. })));
    }

    #[tokio::test]
    async fn test_local_session_merges_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let shell = local();
        let mut child = shell
            .spawn_session(&dir.path().to_string_lossy(), "sh -c 'pwd; echo err >&2'")
            .unwrap();

        let mut out = String::new();
        child
            .stdout
            .take()
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        child.wait().await.unwrap();

        assert!(out.contains(&*dir.path().to_string_lossy()));
        assert!(out.contains("err"));
    }
}
