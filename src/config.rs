//! Runtime configuration
//!
//! Values come from the environment (with `.env` support) or from a YAML
//! file. Every field has a default except the backend credentials, which are
//! required unless demo mode is on.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PREFIX: &str = "CLEAN_QUARTER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "missing backend configuration: set CLEAN_QUARTER_SUPABASE_URL and \
         CLEAN_QUARTER_SUPABASE_ANON_KEY, or enable CLEAN_QUARTER_DEMO_MODE=true"
    )]
    MissingBackend,

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub default_headers: BTreeMap<String, String>,
}

impl ApiClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        let mut default_headers = BTreeMap::new();
        default_headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            base_url: "https://api.example.com".to_string(),
            timeout_ms: 30_000,
            retries: 3,
            retry_delay_ms: 1_000,
            default_headers,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub demo_mode: bool,
}

impl BackendConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if self.demo_mode || (present(&self.url) && present(&self.anon_key)) {
            Ok(())
        } else {
            Err(ConfigError::MissingBackend)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level of the in-memory application log.
    pub level: String,
    pub max_logs: usize,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            max_logs: 1000,
            filter: "clean_quarter=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub default_language: String,
    pub max_errors: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_language: "bg".to_string(),
            max_errors: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiClientConfig,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
}

// =============================================================================
// LOADING
// =============================================================================

impl AppConfig {
    /// Load `.env` if present, then read `CLEAN_QUARTER_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "ignoring unreadable .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Keys are given with the `CLEAN_QUARTER_` prefix.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };
        let mut config = Self::default();

        if let Some((_, url)) = var("API_URL") {
            config.api.base_url = url;
        }
        if let Some((key, value)) = var("API_TIMEOUT_MS") {
            config.api.timeout_ms = parse(&key, &value)?;
        }
        if let Some((key, value)) = var("API_RETRIES") {
            config.api.retries = parse(&key, &value)?;
        }
        if let Some((key, value)) = var("API_RETRY_DELAY_MS") {
            config.api.retry_delay_ms = parse(&key, &value)?;
        }

        config.backend.url = var("SUPABASE_URL").map(|(_, v)| v);
        config.backend.anon_key = var("SUPABASE_ANON_KEY").map(|(_, v)| v);
        if let Some((key, value)) = var("DEMO_MODE") {
            config.backend.demo_mode = parse_bool(&key, &value)?;
        }

        if let Some((_, level)) = var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some((key, value)) = var("MAX_LOGS") {
            config.logging.max_logs = parse(&key, &value)?;
        }
        if let Some((_, language)) = var("DEFAULT_LANGUAGE") {
            config.store.default_language = language;
        }

        config.backend.validate()?;
        tracing::debug!(
            base_url = %config.api.base_url,
            demo_mode = config.backend.demo_mode,
            "configuration loaded from environment"
        );
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Yaml {
            path: origin.to_string(),
            source,
        })?;
        config.backend.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: shown.clone(),
            source,
        })?;
        let config = Self::from_yaml_str(&content, &shown)?;
        tracing::info!(path = %shown, "configuration loaded from file");
        Ok(config)
    }

    /// Demo-mode configuration with every other field defaulted.
    pub fn demo() -> Self {
        let mut config = Self::default();
        config.backend.demo_mode = true;
        config
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn demo_mode_needs_no_backend() {
        let config = AppConfig::from_lookup(lookup(&[("CLEAN_QUARTER_DEMO_MODE", "true")])).unwrap();
        assert!(config.backend.demo_mode);
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
        assert_eq!(config.api.retries, 3);
        assert_eq!(config.store.default_language, "bg");
        assert_eq!(config.store.max_errors, 50);
        assert_eq!(config.logging.max_logs, 1000);
    }

    #[test]
    fn missing_backend_is_reported() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBackend));
        assert!(err.to_string().contains("CLEAN_QUARTER_SUPABASE_URL"));
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup(&[
            ("CLEAN_QUARTER_SUPABASE_URL", "https://x.supabase.co"),
            ("CLEAN_QUARTER_SUPABASE_ANON_KEY", "anon"),
            ("CLEAN_QUARTER_API_RETRIES", "5"),
            ("CLEAN_QUARTER_API_RETRY_DELAY_MS", "250"),
            ("CLEAN_QUARTER_DEFAULT_LANGUAGE", "en"),
        ]))
        .unwrap();
        assert_eq!(config.api.retries, 5);
        assert_eq!(config.api.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.store.default_language, "en");
        assert_eq!(config.backend.anon_key.as_deref(), Some("anon"));
    }

    #[test]
    fn bad_number_is_invalid() {
        let err = AppConfig::from_lookup(lookup(&[
            ("CLEAN_QUARTER_DEMO_MODE", "1"),
            ("CLEAN_QUARTER_API_RETRIES", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "CLEAN_QUARTER_API_RETRIES"));
    }

    #[test]
    fn yaml_file_with_partial_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "backend:\n  demo_mode: true\napi:\n  retries: 1\nstore:\n  default_language: en"
        )
        .unwrap();

        let config = AppConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.api.retries, 1);
        assert_eq!(config.api.timeout_ms, 30_000);
        assert_eq!(config.store.default_language, "en");
        assert_eq!(config.store.max_errors, 50);
    }

    #[test]
    fn missing_yaml_file_is_io_error() {
        let err = AppConfig::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
