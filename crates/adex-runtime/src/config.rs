//! Runtime configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use adex_core::{duration_str, AdexError, AdexResult, ExchangeConfig};
use adex_store::MemoryStore;

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing-subscriber` filter directive, e.g. `"info,adex_exchange=debug"`
    pub filter: String,
    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: "info".into(),
            json: false,
        }
    }
}

/// Service configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub exchange: ExchangeConfig,
    /// Maximum allocator calls running at once
    pub max_in_flight: usize,
    /// Upper bound on one request, store round trips included
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
    pub log: LogConfig,
    /// JSON ledger loaded at start-up
    pub seed_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            exchange: ExchangeConfig::default(),
            max_in_flight: 256,
            request_timeout: Duration::from_secs(2),
            log: LogConfig::default(),
            seed_path: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> AdexResult<Self> {
        let config: RuntimeConfig = serde_json::from_str(json)
            .map_err(|e| AdexError::InvalidConfig(format!("malformed runtime config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> AdexResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AdexError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Apply `ADEX_*` overrides from the process environment
    pub fn with_env(self) -> AdexResult<Self> {
        self.with_overrides(std::env::vars())
    }

    /// Apply `ADEX_*` overrides from an arbitrary variable set
    pub fn with_overrides<I, K, V>(mut self, vars: I) -> AdexResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                "ADEX_LOG" => self.log.filter = value.to_string(),
                "ADEX_LOG_JSON" => self.log.json = parse_flag("ADEX_LOG_JSON", value)?,
                "ADEX_INITIAL_GRANT" => {
                    self.exchange.initial_grant = parse_number("ADEX_INITIAL_GRANT", value)?
                }
                "ADEX_REQUESTER_POLICY" => self.exchange.requester_policy = value.parse()?,
                "ADEX_MAX_IN_FLIGHT" => {
                    self.max_in_flight = parse_number("ADEX_MAX_IN_FLIGHT", value)?
                }
                "ADEX_REQUEST_TIMEOUT" => {
                    self.request_timeout = humantime::parse_duration(value).map_err(|e| {
                        AdexError::InvalidConfig(format!("ADEX_REQUEST_TIMEOUT: {e}"))
                    })?
                }
                "ADEX_SEED" => self.seed_path = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> AdexResult<()> {
        self.exchange.validate()?;
        if self.max_in_flight == 0 {
            return Err(AdexError::InvalidConfig(
                "max_in_flight must be at least 1".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(AdexError::InvalidConfig(
                "request_timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> AdexResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AdexError::InvalidConfig(format!("{key}: not a flag: {other}"))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> AdexResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AdexError::InvalidConfig(format!("{key}: {e}")))
}

/// Load a JSON ledger from disk
pub fn load_seed(path: impl AsRef<Path>) -> AdexResult<MemoryStore> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| {
        AdexError::InvalidConfig(format!("cannot read seed {}: {e}", path.display()))
    })?;
    let store = MemoryStore::from_json(&json)?;
    tracing::info!(path = %path.display(), accounts = store.len(), "ledger seeded");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adex_core::RequesterPolicy;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("adex-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.log.filter, "info");
        assert_eq!(config.max_in_flight, 256);
    }

    #[test]
    fn test_from_json_partial() {
        let config = RuntimeConfig::from_json_str(
            r#"{
                "max_in_flight": 8,
                "request_timeout": "750ms",
                "log": {"json": true},
                "exchange": {"initial_grant": 25}
            }"#,
        )
        .unwrap();

        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.request_timeout, Duration::from_millis(750));
        assert!(config.log.json);
        assert_eq!(config.log.filter, "info");
        assert_eq!(config.exchange.initial_grant, 25);
        assert_eq!(config.exchange.min_credits, 1);
    }

    #[test]
    fn test_from_json_rejects_invalid_values() {
        assert!(RuntimeConfig::from_json_str(r#"{"max_in_flight": 0}"#).is_err());
        assert!(RuntimeConfig::from_json_str(r#"{"request_timeout": "soon"}"#).is_err());
        assert!(RuntimeConfig::from_json_str("[]").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = RuntimeConfig::default()
            .with_overrides([
                ("ADEX_LOG", "debug"),
                ("ADEX_LOG_JSON", "yes"),
                ("ADEX_INITIAL_GRANT", "40"),
                ("ADEX_REQUESTER_POLICY", "auto-create"),
                ("ADEX_MAX_IN_FLIGHT", "16"),
                ("ADEX_REQUEST_TIMEOUT", "5s"),
                ("ADEX_SEED", "/var/lib/adex/ledger.json"),
                ("HOME", "/root"),
            ])
            .unwrap();

        assert_eq!(config.log.filter, "debug");
        assert!(config.log.json);
        assert_eq!(config.exchange.initial_grant, 40);
        assert_eq!(config.exchange.requester_policy, RequesterPolicy::AutoCreate);
        assert_eq!(config.max_in_flight, 16);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(
            config.seed_path.as_deref(),
            Some(Path::new("/var/lib/adex/ledger.json"))
        );
    }

    #[test]
    fn test_env_overrides_reject_garbage() {
        let bad = [
            ("ADEX_LOG_JSON", "perhaps"),
            ("ADEX_INITIAL_GRANT", "lots"),
            ("ADEX_REQUESTER_POLICY", "never"),
            ("ADEX_MAX_IN_FLIGHT", "0"),
        ];
        for pair in bad {
            assert!(
                RuntimeConfig::default().with_overrides([pair]).is_err(),
                "accepted {pair:?}"
            );
        }
    }

    #[test]
    fn test_from_file_and_seed() {
        let config_path = temp_file("config.json", r#"{"max_in_flight": 3}"#);
        let config = RuntimeConfig::from_file(&config_path).unwrap();
        assert_eq!(config.max_in_flight, 3);

        let seed_path = temp_file("seed.json", r#"[{"id":"a","credits":5},{"id":"b","credits":0}]"#);
        let store = load_seed(&seed_path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_credits(), 5);

        std::fs::remove_file(config_path).ok();
        std::fs::remove_file(seed_path).ok();
    }

    #[test]
    fn test_missing_files_are_config_errors() {
        assert!(matches!(
            RuntimeConfig::from_file("/definitely/not/here.json"),
            Err(AdexError::InvalidConfig(_))
        ));
        assert!(matches!(
            load_seed("/definitely/not/here.json"),
            Err(AdexError::InvalidConfig(_))
        ));
    }
}
