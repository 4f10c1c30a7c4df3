use crate::debugger::Error;
use crate::{muted_error, weak_error, xr_error, xr_warn};
use serde::Deserialize;
use std::fs::read_to_string;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Debugging server settings, `[server]` section of the config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address of the HTTP/WebSocket listener.
    pub listen: String,
    /// Network poll tick.
    pub poll_interval_ms: u64,
    /// Minimal interval between two pushes while the machine is running.
    pub push_interval_ms: u64,
    /// How long a state, memory or control request waits for the emulation executor.
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            poll_interval_ms: 10,
            push_interval_ms: 40,
            request_timeout_ms: 1000,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, Error> {
        self.listen
            .parse()
            .map_err(|_| Error::ListenAddress(self.listen.clone()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Application config.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
}

impl Config {
    const DEFAULT_PATH: &'static str = ".config/xray/config.toml";

    /// Load config from file, default location is used if path is not set.
    /// Return [`None`] on errors.
    pub fn from_file(path: Option<&Path>) -> Option<Self> {
        let data = match path {
            None => {
                let path = home::home_dir()?;
                let path = path.join(Self::DEFAULT_PATH);
                muted_error!(read_to_string(path))?
            }
            Some(path) => match read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    xr_error!(target: "debugger", "Error while load config file: {err}");
                    return None;
                }
            },
        };

        weak_error!(Self::parse(&data))
    }

    pub fn parse(data: &str) -> Result<Self, Error> {
        Ok(toml::de::from_str(data)?)
    }
}

/// Read-only configuration (set only once, at start).
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Set initial configuration.
pub fn set(config: Config) {
    if CONFIG.set(config).is_err() {
        xr_warn!(target: "debugger", "Configuration already set, new one is ignored");
    }
}

/// Return application config, defaults are used if it was never set.
pub fn current() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}
