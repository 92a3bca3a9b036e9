//! Supervision of one long-running simulator process
//!
//! `start` returns as soon as the session is up; a background task copies the
//! process console to a local file until `stop` cancels it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::shell::Shell;
use crate::common::{Error, Result};

const READ_CHUNK: usize = 8192;

/// Handle on a remote process and its output capture
#[derive(Debug)]
pub struct RemoteProcess {
    name: String,
    shell: Arc<dyn Shell>,
    workdir: String,
    command: String,
    sink: PathBuf,
    running: Option<Running>,
}

#[derive(Debug)]
struct Running {
    child: Child,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

impl RemoteProcess {
    /// `name` labels logs (e.g. `NE`); console output goes to `sink`
    pub fn new(
        name: impl Into<String>,
        shell: Arc<dyn Shell>,
        workdir: impl Into<String>,
        command: impl Into<String>,
        sink: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            shell,
            workdir: workdir.into(),
            command: command.into(),
            sink: sink.into(),
            running: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sink(&self) -> &Path {
        &self.sink
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Push a config file to the host.
    ///
    /// Skipped when no local path is given. A failed transfer is logged and
    /// not returned; `start` is still allowed afterwards.
    pub async fn apply_config(&self, local: Option<&Path>, remote: &str) {
        let Some(local) = local.filter(|p| !p.as_os_str().is_empty()) else {
            info!("No config file given for {}, keeping the current one", self.name);
            return;
        };

        info!(
            "Applying {} config {} -> {}",
            self.name,
            local.display(),
            remote
        );
        match self.shell.upload(local, remote).await {
            Ok(()) => info!("{} config applied", self.name),
            Err(e) => error!("Failed to apply {} config: {}", self.name, e),
        }
    }

    /// Start the process and its output capture without waiting for it.
    ///
    /// Fails with [`Error::ConnectionFailed`] when the host cannot be
    /// reached. Starting a running process is a no-op.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            warn!("{} simulator is already running", self.name);
            return Ok(());
        }

        self.shell.probe().await.map_err(|e| {
            error!("Failed to connect to {} host: {}", self.name, e);
            match e {
                Error::ConnectionFailed { .. } => e,
                other => Error::connection_failed(self.shell.target(), other),
            }
        })?;

        if let Some(parent) = self.sink.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Starting {} simulator: cd {} && {}", self.name, self.workdir, self.command);
        let mut child = self.shell.spawn_session(&self.workdir, &self.command)?;
        let stdout = child.stdout.take().ok_or_else(|| Error::ProcessStartFailed {
            name: self.name.clone(),
            reason: "session has no output pipe".to_string(),
        })?;

        let cancel = CancellationToken::new();
        let reader = tokio::spawn(capture_output(
            self.name.clone(),
            stdout,
            self.sink.clone(),
            cancel.clone(),
        ));

        self.running = Some(Running {
            child,
            cancel,
            reader,
        });
        info!("{} simulator started, output -> {}", self.name, self.sink.display());
        Ok(())
    }

    /// Stop the output capture and close the session. Idempotent.
    pub async fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            debug!("{} simulator is not running", self.name);
            return;
        };

        info!("Stopping {} simulator", self.name);
        running.cancel.cancel();
        if let Err(e) = running.reader.await {
            warn!("{} output reader ended abnormally: {}", self.name, e);
        }
        if let Err(e) = running.child.kill().await {
            debug!("{} session already closed: {}", self.name, e);
        }
    }
}

impl Drop for RemoteProcess {
    fn drop(&mut self) {
        // The child is killed on drop; the reader only needs the signal
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

/// Copy process output into `sink` until cancelled or the stream ends
async fn capture_output(
    name: String,
    mut stdout: ChildStdout,
    sink: PathBuf,
    cancel: CancellationToken,
) {
    if let Err(e) = pump(&mut stdout, &sink, &cancel).await {
        error!("Error while capturing {} output: {}", name, e);
    }
    info!("{} simulator stopped successfully", name);
}

async fn pump(
    stdout: &mut ChildStdout,
    sink: &Path,
    cancel: &CancellationToken,
) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(sink)
        .await?;
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = stdout.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    break;
                }
                let text = String::from_utf8_lossy(&buf[..n]);
                file.write_all(text.as_bytes()).await?;
                file.flush().await?;
            }
        }
    }
    Ok(())
}
