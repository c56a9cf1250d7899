use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Server configuration. Sources, lowest priority first: built-in defaults,
/// optional JSON config file (`-c`/`--config` or the `CONFIG` env var),
/// environment variables. `store_interval` accepts plain seconds or a human
/// duration; zero switches the file-backed store into synchronous mode.
/// A non-empty `database_dsn` overrides file backing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub log_level: String,
    #[serde(deserialize_with = "duration_secs_or_human")]
    pub store_interval: Duration,
    pub file_storage_path: Option<String>,
    pub restore: bool,
    pub database_dsn: Option<String>,
    pub signing_key: Option<String>,
    pub crypto_key: Option<String>,
    pub audit_file: Option<String>,
    pub audit_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            log_level: "info".to_string(),
            store_interval: Duration::from_secs(300),
            file_storage_path: None,
            restore: false,
            database_dsn: None,
            signing_key: None,
            crypto_key: None,
            audit_file: None,
            audit_url: None,
        }
    }
}

impl ServerConfig {
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
        config.normalize();
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_value("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = env_value("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = env_value("STORE_INTERVAL") {
            self.store_interval = parse_duration(&v).context("invalid STORE_INTERVAL")?;
        }
        if let Some(v) = env_value("FILE_STORAGE_PATH") {
            self.file_storage_path = Some(v);
        }
        if let Some(v) = env_value("RESTORE") {
            self.restore = v.parse().context("invalid RESTORE")?;
        }
        if let Some(v) = env_value("DATABASE_DSN") {
            self.database_dsn = Some(v);
        }
        if let Some(v) = env_value("KEY") {
            self.signing_key = Some(v);
        }
        if let Some(v) = env_value("CRYPTO_KEY") {
            self.crypto_key = Some(v);
        }
        if let Some(v) = env_value("AUDIT_FILE") {
            self.audit_file = Some(v);
        }
        if let Some(v) = env_value("AUDIT_URL") {
            self.audit_url = Some(v);
        }
        Ok(())
    }

    /// Empty strings in the config file mean "disabled", same as absent.
    fn normalize(&mut self) {
        for field in [
            &mut self.file_storage_path,
            &mut self.database_dsn,
            &mut self.signing_key,
            &mut self.crypto_key,
            &mut self.audit_file,
            &mut self.audit_url,
        ] {
            if field.as_deref() == Some("") {
                *field = None;
            }
        }
    }

    pub fn synchronous_store(&self) -> bool {
        self.store_interval.is_zero()
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Accepts either plain seconds (`"300"`) or a human duration (`"5m"`).
fn parse_duration(value: &str) -> Result<Duration> {
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).with_context(|| format!("invalid duration {value:?}"))
}

fn duration_secs_or_human<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Human(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Human(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn config_file_path() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "-c" || arg == "--config" {
            return args.next();
        }
    }
    env_value("CONFIG")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_contract() {
        let config = ServerConfig::default();
        assert_eq!(config.address, "localhost:8080");
        assert_eq!(config.store_interval, Duration::from_secs(300));
        assert!(!config.restore);
        assert!(config.file_storage_path.is_none());
    }

    #[test]
    fn store_interval_accepts_seconds_and_human_units() {
        let config: ServerConfig = serde_json::from_str(r#"{"store_interval": 0}"#).unwrap();
        assert!(config.synchronous_store());

        let config: ServerConfig = serde_json::from_str(r#"{"store_interval": "5m"}"#).unwrap();
        assert_eq!(config.store_interval, Duration::from_secs(300));
    }

    #[test]
    fn empty_strings_disable_optional_backends() {
        let mut config: ServerConfig = serde_json::from_str(
            r#"{"file_storage_path": "", "database_dsn": "", "signing_key": "s"}"#,
        )
        .unwrap();
        config.normalize();
        assert!(config.file_storage_path.is_none());
        assert!(config.database_dsn.is_none());
        assert_eq!(config.signing_key.as_deref(), Some("s"));
    }
}
