//! Remote hosts: command execution, simulator supervision and the gateway

mod gateway;
mod process;
mod shell;

pub use gateway::{Gateway, LOG_TIME_FORMAT};
pub use process::RemoteProcess;
pub use shell::{connect, CommandOutput, LocalShell, Shell, SshShell};
