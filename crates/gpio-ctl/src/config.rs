use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::str::FromStr;

use crate::hal::pigpiod::PigpiodConfig;
use crate::hal::sim::SimConfig;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, From, Display)]
pub enum ConfigError {
    #[from(skip)]
    #[display("unknown backend {_0:?}, expected sim or pigpiod")]
    UnknownBackend(String),
    #[from(skip)]
    #[display("invalid {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

    // External
    #[display("{_0}")]
    IoError(io::Error),
    #[display("{_0}")]
    SerdeJson(serde_json::Error),
}

impl std::error::Error for ConfigError {}

/// Which pin controller implementation to open.
#[derive(
    Debug, Default, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process simulated board.
    #[display("sim")]
    Sim,
    /// pigpio daemon over TCP.
    #[default]
    #[display("pigpiod")]
    Pigpiod,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sim" => Ok(Backend::Sim),
            "pigpiod" => Ok(Backend::Pigpiod),
            _ => Err(ConfigError::UnknownBackend(s.to_owned())),
        }
    }
}

/// Service configuration. Every field has a default, so an empty JSON
/// object is a valid file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub pigpiod: PigpiodConfig,
    pub sim: SimConfig,
    /// Log filter directive, e.g. `info` or `gpio_ctl=debug`.
    pub log: Option<String>,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Apply the `PIGPIO_ADDR` and `PIGPIO_PORT` variables pigpio clients
    /// honour.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(
        &mut self,
        var: impl Fn(&'static str) -> Option<String>,
    ) -> Result<()> {
        if let Some(host) = var("PIGPIO_ADDR").filter(|h| !h.is_empty()) {
            self.pigpiod.host = host;
        }
        if let Some(port) = var("PIGPIO_PORT") {
            self.pigpiod.port = port.parse().map_err(|_| {
                ConfigError::InvalidEnv { name: "PIGPIO_PORT", value: port }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_json(
            r#"{"backend": "sim", "pigpiod": {"port": 9999}, "log": "debug"}"#,
        )
        .unwrap();
        assert_eq!(config.backend, Backend::Sim);
        assert_eq!(config.pigpiod.port, 9999);
        assert_eq!(config.pigpiod.host, "localhost");
        assert_eq!(config.sim, SimConfig::default());
        assert_eq!(config.log.as_deref(), Some("debug"));
    }

    #[test]
    fn bad_backend_rejected() {
        assert!(Config::from_json(r#"{"backend": "wiringpi"}"#).is_err());
        assert!(matches!(
            "wiringpi".parse::<Backend>(),
            Err(ConfigError::UnknownBackend(_))
        ));
        assert_eq!("SIM".parse::<Backend>().unwrap(), Backend::Sim);
    }

    #[test]
    fn env_overrides_daemon_address() {
        let mut config = Config::default();
        config
            .apply_vars(|name| match name {
                "PIGPIO_ADDR" => Some("raspberrypi.local".into()),
                "PIGPIO_PORT" => Some("8889".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.pigpiod.host, "raspberrypi.local");
        assert_eq!(config.pigpiod.port, 8889);

        let err = config
            .apply_vars(|name| (name == "PIGPIO_PORT").then(|| "x".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }
}
