use crate::error::{HookError, Result};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address to listen on. Accepts `host:port` or the short `:port` form.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Directory holding one executable per repository, at `<owner>/<name>`.
    #[serde(default = "default_actions_dir")]
    pub actions_dir: PathBuf,
    /// Kill an action that runs longer than this. Absent or 0 means no limit.
    #[serde(default)]
    pub action_timeout_secs: Option<u64>,
    /// How long shutdown waits for in-flight dispatches. 0 abandons them.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_listen() -> String {
    ":8080".to_string()
}

fn default_actions_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_shutdown_grace() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            actions_dir: default_actions_dir(),
            action_timeout_secs: None,
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_listen(&self.listen)
    }

    pub fn action_timeout(&self) -> Option<Duration> {
        self.action_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Problems worth reporting at startup. Only `Error`-level warnings
    /// should stop the service.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Err(e) = self.listen_addr() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: e.to_string(),
            });
        }

        if !self.actions_dir.is_dir() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "actions directory {} does not exist; every push will find no action",
                    self.actions_dir.display()
                ),
            });
        }

        warnings
    }
}

/// Parse a listen address, accepting `:8080` as shorthand for all
/// interfaces.
pub fn parse_listen(value: &str) -> Result<SocketAddr> {
    let value = value.trim();
    if let Some(port) = value.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .map_err(|_| HookError::InvalidConfig(format!("invalid listen port '{port}'")))?;
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    }
    value
        .parse()
        .map_err(|_| HookError::InvalidConfig(format!("invalid listen address '{value}'")))
}
