//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Run-wide settings: log level, artifact locations, declarative tables
    #[serde(default)]
    pub automation: AutomationConfig,

    /// The gateway under test
    #[serde(default)]
    pub alg: AlgConfig,

    /// Network element simulator
    #[serde(default)]
    pub ne: SimulatorConfig,

    /// Network element manager simulator
    #[serde(default)]
    pub nem: SimulatorConfig,

    /// Client identity for the REST channel
    #[serde(default)]
    pub tls: TlsConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// How commands reach a host
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Through the system `ssh`/`scp` binaries
    #[default]
    Ssh,
    /// On this machine with `sh -c`
    Local,
}

/// Connection parameters shared by every remote host
#[derive(Debug, Deserialize, Clone)]
pub struct HostConfig {
    /// Hostname or IP address
    #[serde(default)]
    pub host: String,

    /// Login user
    #[serde(default)]
    pub user: Option<String>,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Private key used for authentication (agent/default keys otherwise)
    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    #[serde(default)]
    pub transport: Transport,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: None,
            ssh_port: default_ssh_port(),
            identity_file: None,
            transport: Transport::default(),
        }
    }
}

impl HostConfig {
    /// `user@host` or just `host`
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// A local host needs no address
    pub fn is_configured(&self) -> bool {
        self.transport == Transport::Local || !self.host.is_empty()
    }
}

fn default_ssh_port() -> u16 {
    22
}

/// Run-wide settings
#[derive(Debug, Deserialize, Clone)]
pub struct AutomationConfig {
    /// Default log level (overridden by `RUST_LOG`)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory under which each run gets its own `report-<timestamp>` folder
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    /// Declarative API table (JSON)
    #[serde(default = "default_api_file")]
    pub api_file: PathBuf,

    /// Expected values keyed by test / assertion id (JSON)
    #[serde(default = "default_expected_file")]
    pub expected_file: PathBuf,

    /// Base HTML template for the report; a built-in one is used when unset
    #[serde(default)]
    pub html_template: Option<PathBuf>,

    /// Default observation window for simulator traffic
    #[serde(default = "default_observation")]
    pub observation_secs: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            reports_dir: default_reports_dir(),
            api_file: default_api_file(),
            expected_file: default_expected_file(),
            html_template: None,
            observation_secs: default_observation(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}
fn default_api_file() -> PathBuf {
    PathBuf::from("Config/api.json")
}
fn default_expected_file() -> PathBuf {
    PathBuf::from("Config/expected_values.json")
}
fn default_observation() -> u64 {
    10
}

/// Gateway settings
#[derive(Debug, Deserialize, Clone)]
pub struct AlgConfig {
    #[serde(flatten)]
    pub remote: HostConfig,

    /// Name the REST endpoint's certificate is issued for
    #[serde(default)]
    pub domain_name: String,

    /// REST port
    #[serde(default = "default_rest_port")]
    pub port: u16,

    /// systemd unit of the gateway
    #[serde(default = "default_service")]
    pub service: String,

    /// Gateway JSON configuration file on the remote host
    #[serde(default = "default_alg_config_path")]
    pub config_path: String,

    /// Health query; `{service}` is substituted
    #[serde(default = "default_status_command")]
    pub status_command: String,

    /// Log query; `{service}`, `{since}` and `{until}` are substituted
    #[serde(default = "default_log_command")]
    pub log_command: String,
}

impl Default for AlgConfig {
    fn default() -> Self {
        Self {
            remote: HostConfig::default(),
            domain_name: String::new(),
            port: default_rest_port(),
            service: default_service(),
            config_path: default_alg_config_path(),
            status_command: default_status_command(),
            log_command: default_log_command(),
        }
    }
}

fn default_rest_port() -> u16 {
    8443
}
fn default_service() -> String {
    "alggo".to_string()
}
fn default_alg_config_path() -> String {
    "/etc/alggo/config.json".to_string()
}
fn default_status_command() -> String {
    "systemctl status {service} | head -n 10".to_string()
}
fn default_log_command() -> String {
    "journalctl --no-pager -u {service} --since \"{since}\" --until \"{until}\"".to_string()
}

/// NE or NEM simulator settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SimulatorConfig {
    #[serde(flatten)]
    pub remote: HostConfig,

    /// Working directory of the simulator on its host
    #[serde(default)]
    pub start_path: String,

    /// Command that starts the simulator in the foreground
    #[serde(default)]
    pub start_command: String,

    /// Certificate, key and CA the simulator presents
    #[serde(default)]
    pub cert: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub ca: String,

    /// Whitelisted addresses
    #[serde(default)]
    pub ipv4_address: String,
    #[serde(default)]
    pub ipv6_address: String,

    /// Whitelisted ports
    #[serde(default)]
    pub ports: Vec<u16>,

    /// File the NE simulator serves over FTP
    #[serde(default)]
    pub ftp_upload_file: Option<String>,

    /// Server name the simulator checks the gateway certificate against
    #[serde(default)]
    pub tls_server_name: Option<String>,
}

impl SimulatorConfig {
    /// Where the simulator expects its config file
    pub fn remote_config_path(&self) -> String {
        format!("{}/config.yaml", self.start_path.trim_end_matches('/'))
    }
}

/// Client identity for the mutually authenticated REST channel
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub cert: PathBuf,
    #[serde(default)]
    pub key: PathBuf,
    #[serde(default)]
    pub ca: PathBuf,
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// SSH connection establishment
    #[serde(default = "default_connect")]
    pub connect_secs: u64,

    /// One-shot remote commands and transfers
    #[serde(default = "default_command")]
    pub command_secs: u64,

    /// REST requests
    #[serde(default = "default_request")]
    pub request_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect(),
            command_secs: default_command(),
            request_secs: default_request(),
        }
    }
}

fn default_connect() -> u64 {
    10
}
fn default_command() -> u64 {
    60
}
fn default_request() -> u64 {
    30
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::parse(&content)
    }

    /// Load from `path` if given, otherwise from the default location
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        }
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.automation.log_level, "info");
        assert_eq!(config.alg.service, "alggo");
        assert_eq!(config.alg.remote.ssh_port, 22);
        assert_eq!(config.timeouts.connect_secs, 10);
        assert_eq!(config.automation.observation_secs, 10);
    }

    #[test]
    fn test_parse_full_sections() {
        let config = Config::parse(
            r#"
[automation]
log_level = "debug"
reports_dir = "out"

[alg]
host = "10.0.0.5"
user = "admin"
domain_name = "alg.example.net"
port = 9443

[ne]
host = "10.0.0.6"
transport = "local"
start_path = "/opt/ne/"
start_command = "./ne-sim"
ports = [3000, 3001]

[tls]
cert = "certs/client.crt"
key = "certs/client.key"
ca = "certs/ca.crt"
"#,
        )
        .unwrap();

        assert_eq!(config.automation.log_level, "debug");
        assert_eq!(config.alg.remote.destination(), "admin@10.0.0.5");
        assert_eq!(config.alg.port, 9443);
        assert_eq!(config.ne.remote.transport, Transport::Local);
        assert_eq!(config.ne.remote.destination(), "10.0.0.6");
        assert_eq!(config.ne.ports, vec![3000, 3001]);
        assert_eq!(config.ne.remote_config_path(), "/opt/ne/config.yaml");
        assert_eq!(config.tls.ca, PathBuf::from("certs/ca.crt"));
    }

    #[test]
    fn test_invalid_toml_is_config_parse_error() {
        let err = Config::parse("[alg\nhost=").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }
}
