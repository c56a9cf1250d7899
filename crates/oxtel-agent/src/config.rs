use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Agent configuration. Sources, lowest priority first: built-in defaults,
/// optional JSON config file (`-c`/`--config` or the `CONFIG` env var),
/// environment variables. Durations in the JSON file accept human units
/// (`"2s"`, `"5m"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub address: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
    pub rate_limit: usize,
    pub signing_key: Option<String>,
    pub crypto_key: Option<String>,
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            rate_limit: 5,
            signing_key: None,
            crypto_key: None,
            log_level: "info".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn load() -> Result<Self> {
        let mut config = match config_file_path() {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {path:?}"))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("failed to parse config file {path:?}"))?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_value("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = env_value("POLL_INTERVAL") {
            self.poll_interval = parse_duration(&v).context("invalid POLL_INTERVAL")?;
        }
        if let Some(v) = env_value("REPORT_INTERVAL") {
            self.report_interval = parse_duration(&v).context("invalid REPORT_INTERVAL")?;
        }
        if let Some(v) = env_value("RATE_LIMIT") {
            self.rate_limit = v.parse().context("invalid RATE_LIMIT")?;
        }
        if let Some(v) = env_value("KEY") {
            self.signing_key = Some(v);
        }
        if let Some(v) = env_value("CRYPTO_KEY") {
            self.crypto_key = Some(v);
        }
        if let Some(v) = env_value("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    /// Base URL of the metric server, with a scheme prepended when the
    /// configured address is a bare `host:port`.
    pub fn http_endpoint(&self) -> String {
        let addr = self.address.trim();
        if addr.contains("://") {
            return addr.trim_end_matches('/').to_string();
        }
        format!("http://{addr}")
    }
}

pub(crate) fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Accepts either plain seconds (`"300"`) or a human duration (`"5m"`).
pub(crate) fn parse_duration(value: &str) -> Result<Duration> {
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).with_context(|| format!("invalid duration {value:?}"))
}

pub(crate) fn config_file_path() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "-c" || arg == "--config" {
            return args.next();
        }
    }
    env_value("CONFIG")
}
