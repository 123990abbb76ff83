use std::time::Duration;

use serde::Deserialize;

use crate::domain::WatchdogConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub source_url: String,
    /// Optional when the ABI document is a deploy artifact that records
    /// the address itself.
    pub contract_address: Option<String>,
    pub event_name: String,
    #[serde(default = "default_abi_path")]
    pub abi_path: String,
    pub poll_interval_seconds: u64,
    pub retry_interval_seconds: u64,
    pub alert_origin: String,
    pub alert_destination: String,
    #[serde(default)]
    pub retry_initial_connect: bool,
}

fn default_abi_path() -> String {
    "contract_abi.json".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("no contract address: set contract_address or point abi_path at an artifact that records one")]
    NoAddress,
    #[error("poll_interval_seconds must be greater than zero")]
    ZeroPollInterval,
    #[error("retry_interval_seconds ({retry}) must be strictly greater than poll_interval_seconds ({poll})")]
    RetryNotLonger { poll: u64, retry: u64 },
}

impl Config {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let raw = expand_env(&raw);
        let cfg: Config = serde_yaml::from_str(&raw)?;
        Ok(cfg)
    }

    /// Validate into the immutable runtime config. `deployed_address` is
    /// the fallback learned from the deploy artifact, if any.
    pub fn into_watchdog_config(
        self,
        deployed_address: Option<String>,
    ) -> Result<WatchdogConfig, ConfigError> {
        require("source_url", &self.source_url)?;
        require("event_name", &self.event_name)?;
        require("alert_origin", &self.alert_origin)?;
        require("alert_destination", &self.alert_destination)?;

        let contract_address = self
            .contract_address
            .filter(|a| !a.is_empty())
            .or(deployed_address)
            .ok_or(ConfigError::NoAddress)?;

        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.retry_interval_seconds <= self.poll_interval_seconds {
            return Err(ConfigError::RetryNotLonger {
                poll: self.poll_interval_seconds,
                retry: self.retry_interval_seconds,
            });
        }

        Ok(WatchdogConfig {
            source_url: self.source_url,
            contract_address,
            event_name: self.event_name,
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            retry_interval: Duration::from_secs(self.retry_interval_seconds),
            alert_origin: self.alert_origin,
            alert_destination: self.alert_destination,
            retry_initial_connect: self.retry_initial_connect,
        })
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::MissingField(field));
    }
    Ok(())
}

/// very small ${VAR} expansion to keep config simple
fn expand_env(s: &str) -> String {
    let mut out = s.to_string();
    for (k, v) in std::env::vars() {
        out = out.replace(&format!("${{{}}}", k), &v);
    }
    out
}
