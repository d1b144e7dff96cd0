//! Service configuration
//!
//! Resolution order: built-in defaults, then an optional YAML file (schema
//! `version: 1`), then environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Supported YAML schema versions
const SUPPORTED_VERSIONS: [u32; 1] = [1];

/// Linters whose findings are kept by default
pub const DEFAULT_LINTERS: [&str; 13] = [
    "deadcode",
    "dupl",
    "errcheck",
    "goconst",
    "gocyclo",
    "gofmt",
    "goimports",
    "golint",
    "gosimple",
    "ineffassign",
    "staticcheck",
    "vet",
    "vetshadow",
];

pub const ENV_DATABASE_PATH: &str = "DATABASE_PATH";
pub const ENV_COLLECTION_TIMEOUT_SECS: &str = "COLLECTION_TIMEOUT_SECS";
pub const ENV_LINTERS: &str = "LINTERS";
pub const ENV_REQUIRED_LANGUAGE: &str = "REQUIRED_LANGUAGE";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported configuration version {found}. Supported versions: {}", supported.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "))]
    UnsupportedVersion { found: u32, supported: Vec<u32> },

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// YAML schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileV1 {
    pub version: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub linters: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub database_path: PathBuf,
    pub collection_timeout_secs: u64,
    pub linters: Vec<String>,
    pub required_language: String,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./repograde.db"),
            collection_timeout_secs: 300,
            linters: DEFAULT_LINTERS.iter().map(|l| l.to_string()).collect(),
            required_language: "Go".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Defaults, optional file, then the process environment
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let config = match path {
            Some(path) => Self::from_yaml(path)?,
            None => Self::default(),
        };
        let config = config.with_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from YAML file (v1 schema) on top of the defaults
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;

        if !SUPPORTED_VERSIONS.contains(&file.version) {
            return Err(ConfigError::UnsupportedVersion {
                found: file.version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let mut config = Self::default();
        if let Some(database_path) = file.database_path {
            config.database_path = database_path;
        }
        if let Some(secs) = file.collection_timeout_secs {
            config.collection_timeout_secs = secs;
        }
        if let Some(linters) = file.linters {
            config.linters = linters;
        }
        if let Some(language) = file.required_language {
            config.required_language = language;
        }
        if let Some(level) = file.log_level {
            config.log_level = level;
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`
    pub fn with_env<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(secs) = lookup(ENV_COLLECTION_TIMEOUT_SECS) {
            self.collection_timeout_secs =
                secs.trim().parse().map_err(|e| ConfigError::Invalid {
                    field: ENV_COLLECTION_TIMEOUT_SECS.to_string(),
                    reason: format!("{} ({})", e, secs),
                })?;
        }
        if let Some(linters) = lookup(ENV_LINTERS) {
            self.linters = linters
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(language) = lookup(ENV_REQUIRED_LANGUAGE) {
            self.required_language = language;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        Ok(self)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.collection_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "collection_timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.linters.is_empty() {
            return Err(ConfigError::Invalid {
                field: "linters".to_string(),
                reason: "at least one linter is required".to_string(),
            });
        }
        if self.required_language.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "required_language".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn collection_timeout(&self) -> Duration {
        Duration::from_secs(self.collection_timeout_secs)
    }

    /// Serialize as a v1 YAML document
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: 1,
            database_path: Some(self.database_path.clone()),
            collection_timeout_secs: Some(self.collection_timeout_secs),
            linters: Some(self.linters.clone()),
            required_language: Some(self.required_language.clone()),
            log_level: Some(self.log_level.clone()),
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.collection_timeout(), Duration::from_secs(300));
        assert_eq!(config.linters.len(), 13);
        assert!(config.linters.contains(&"vetshadow".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_loading() {
        let yaml_content = r#"
version: 1
database_path: /tmp/cache.db
collection_timeout_secs: 60
linters: [golint, vet]
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = ServiceConfig::from_yaml(temp_file.path()).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/cache.db"));
        assert_eq!(config.collection_timeout_secs, 60);
        assert_eq!(config.linters, vec!["golint", "vet"]);
        assert_eq!(config.required_language, "Go");
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = ServiceConfig {
            log_level: "debug".to_string(),
            ..Default::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));
        assert_eq!(ServiceConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_unsupported_version() {
        let err = ServiceConfig::from_yaml_str("version: 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { found: 2, .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ServiceConfig::from_yaml_str("version: 1\nredis_url: x\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err =
            ServiceConfig::from_yaml_str("version: 1\ncollection_timeout_secs: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_COLLECTION_TIMEOUT_SECS, "30"),
            (ENV_LINTERS, "golint, vet,,"),
            (ENV_REQUIRED_LANGUAGE, "Rust"),
        ]
        .into_iter()
        .collect();

        let config = ServiceConfig::default()
            .with_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.collection_timeout_secs, 30);
        assert_eq!(config.linters, vec!["golint", "vet"]);
        assert_eq!(config.required_language, "Rust");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_env_bad_timeout() {
        let result = ServiceConfig::default().with_env(|name| {
            (name == ENV_COLLECTION_TIMEOUT_SECS).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_empty_linters_rejected() {
        let config = ServiceConfig::default()
            .with_env(|name| (name == ENV_LINTERS).then(|| " ".to_string()))
            .unwrap();
        assert!(config.validate().is_err());
    }
}
