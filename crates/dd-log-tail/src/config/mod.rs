// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Layered configuration.
//!
//! Sources are applied in the order they are added to the [`ConfigBuilder`],
//! later sources overriding earlier ones:
//! 1. Defaults
//! 2. YAML file (`~/.dlt/config.yaml` or `--config`)
//! 3. Environment variables (`DLT_*`, plus `DD_API_KEY`, `DD_APP_KEY`, `DD_SITE`)
//! 4. Command line flags
//!
//! A source that fails to load is logged and skipped. Nothing is checked until
//! [`Config::validate`] runs.

pub mod env;
pub mod yaml;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, error};

use crate::query::{build_query, split_levels};

pub use env::EnvConfigSource;
pub use yaml::YamlConfigSource;

/// Datadog site used when none is configured.
pub const DEFAULT_SITE: &str = "datadoghq.com";
pub const DEFAULT_OUTPUT_FORMAT: &str = "text";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Failed polls in a row tolerated before tail mode gives up.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

const VALID_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];
const VALID_FORMATS: [&str; 2] = ["json", "text"];

const DEFAULT_CONFIG_FILE: &str = r#"# Datadog Logs Tail Configuration
# API credentials are loaded from environment variables:
#   DD_API_KEY - Datadog API key (required)
#   DD_APP_KEY - Datadog application key (required)
#   DD_SITE - Datadog site (optional, default: datadoghq.com)

# Log filtering (optional)
tags: "service:web,env:production"
log_level: "info"

# Output settings (optional)
output_format: "text"  # json or text

# Connection settings (optional)
timeout: 30
retry_count: 3
"#;

#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Parse(String),
    #[error("config file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("failed to write config file: {0}")]
    Io(#[from] io::Error),
}

#[derive(Clone, PartialEq)]
pub struct Config {
    pub api_key: String,
    pub app_key: String,
    pub site: String,
    /// Comma-separated `key:value` filter.
    pub tags: String,
    /// Raw level filter, single value or comma-separated.
    pub log_level: String,
    /// Levels parsed from `log_level` by [`Config::validate`].
    pub log_levels: Vec<String>,
    pub output_format: String,
    /// Request timeout in seconds.
    pub timeout: u64,
    pub retry_count: u32,
    /// Batch range, `from,to` in RFC3339.
    pub timestamp: String,
    /// Replaces `https://api.<site>` when set.
    pub api_url: Option<String>,
    pub proxy_https: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            app_key: String::new(),
            site: DEFAULT_SITE.to_string(),
            tags: String::new(),
            log_level: String::new(),
            log_levels: Vec::new(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            timestamp: String::new(),
            api_url: None,
            proxy_https: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &redact(&self.api_key))
            .field("app_key", &redact(&self.app_key))
            .field("site", &self.site)
            .field("tags", &self.tags)
            .field("log_level", &self.log_level)
            .field("log_levels", &self.log_levels)
            .field("output_format", &self.output_format)
            .field("timeout", &self.timeout)
            .field("retry_count", &self.retry_count)
            .field("timestamp", &self.timestamp)
            .field("api_url", &self.api_url)
            .field("proxy_https", &self.proxy_https)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl Config {
    /// Checks required fields and normalises the level filter into
    /// [`Config::log_levels`].
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Validation(
                "API key not set (DD_API_KEY)".to_string(),
            ));
        }
        if self.app_key.is_empty() {
            return Err(ConfigError::Validation(
                "application key not set (DD_APP_KEY)".to_string(),
            ));
        }
        if self.site.trim().is_empty() {
            return Err(ConfigError::Validation("site must not be empty".to_string()));
        }

        let format = self.output_format.trim().to_ascii_lowercase();
        if !VALID_FORMATS.contains(&format.as_str()) {
            return Err(ConfigError::Validation(format!(
                "invalid output format: {} (must be 'json' or 'text')",
                self.output_format
            )));
        }
        self.output_format = format;

        let levels = split_levels(&self.log_level);
        if let Some(invalid) = levels
            .iter()
            .find(|level| !VALID_LEVELS.contains(&level.as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "invalid log level: {invalid} (must be debug, info, warn, or error)"
            )));
        }
        self.log_levels = levels;

        if self.timeout == 0 {
            return Err(ConfigError::Validation(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.retry_count == 0 {
            return Err(ConfigError::Validation(
                "retry count must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Search API root, `https://api.<site>` unless overridden.
    pub fn base_url(&self) -> String {
        match &self.api_url {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("https://api.{}", self.site.trim()),
        }
    }

    /// Levels handed to the query builder. A raw value that yielded no
    /// parsed level is used verbatim.
    pub fn query_levels(&self) -> Vec<String> {
        if !self.log_levels.is_empty() {
            return self.log_levels.clone();
        }
        let raw = self.log_level.trim();
        if raw.is_empty() {
            Vec::new()
        } else {
            vec![raw.to_string()]
        }
    }

    /// Search query for the configured tag and level filters.
    pub fn query(&self) -> String {
        build_query(&self.tags, &self.query_levels())
    }
}

/// A set of optional values read from one source. Only present, non-empty
/// values override the configuration.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PartialConfig {
    pub api_key: Option<String>,
    pub app_key: Option<String>,
    pub site: Option<String>,
    pub tags: Option<String>,
    pub log_level: Option<String>,
    pub output_format: Option<String>,
    pub timeout: Option<u64>,
    pub retry_count: Option<u32>,
    pub timestamp: Option<String>,
    pub api_url: Option<String>,
    pub https_proxy: Option<String>,
}

fn merge_string(target: &mut String, value: Option<&String>) {
    if let Some(value) = value {
        if !value.is_empty() {
            target.clone_from(value);
        }
    }
}

fn merge_option(target: &mut Option<String>, value: Option<&String>) {
    if let Some(value) = value {
        if !value.is_empty() {
            *target = Some(value.clone());
        }
    }
}

impl PartialConfig {
    /// Overwrites the fields of `config` that are set and non-empty here.
    pub fn apply(&self, config: &mut Config) {
        merge_string(&mut config.api_key, self.api_key.as_ref());
        merge_string(&mut config.app_key, self.app_key.as_ref());
        merge_string(&mut config.site, self.site.as_ref());
        merge_string(&mut config.tags, self.tags.as_ref());
        merge_string(&mut config.log_level, self.log_level.as_ref());
        merge_string(&mut config.output_format, self.output_format.as_ref());
        merge_string(&mut config.timestamp, self.timestamp.as_ref());
        merge_option(&mut config.api_url, self.api_url.as_ref());
        merge_option(&mut config.proxy_https, self.https_proxy.as_ref());
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(retry_count) = self.retry_count {
            config.retry_count = retry_count;
        }
    }
}

#[allow(clippy::module_name_repetitions)]
pub trait ConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError>;
}

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct FlagsConfigSource(pub PartialConfig);

impl ConfigSource for FlagsConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        self.0.apply(config);
        Ok(())
    }
}

#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Config,
}

#[allow(clippy::module_name_repetitions)]
impl ConfigBuilder {
    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Loads every source in order. Later sources win; failures are logged
    /// and skipped.
    pub fn build(&mut self) -> Config {
        let mut failed_sources = 0;
        for source in &self.sources {
            if let Err(e) = source.load(&mut self.config) {
                error!("Failed to load config: {}", e);
                failed_sources += 1;
            }
        }

        if !self.sources.is_empty() && failed_sources == self.sources.len() {
            debug!("All sources failed to load config, using default config.");
        }

        if self.config.site.trim().is_empty() {
            self.config.site = DEFAULT_SITE.to_string();
        }

        if self.config.proxy_https.is_none() {
            self.config.proxy_https = std::env::var("HTTPS_PROXY")
                .or_else(|_| std::env::var("https_proxy"))
                .ok()
                .filter(|proxy| !proxy.is_empty());
        }

        self.config.clone()
    }
}

/// Loads the configuration from `path`, the environment and the command
/// line, in that order of precedence.
#[must_use]
pub fn get_config(path: &Path, flags: PartialConfig) -> Config {
    ConfigBuilder::default()
        .add_source(Box::new(YamlConfigSource {
            path: path.to_path_buf(),
        }))
        .add_source(Box::new(EnvConfigSource))
        .add_source(Box::new(FlagsConfigSource(flags)))
        .build()
}

/// Writes the commented default configuration file, creating its directory.
/// An existing file is never overwritten.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, DEFAULT_CONFIG_FILE)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            api_key: "api".to_string(),
            app_key: "app".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.site, "datadoghq.com");
        assert_eq!(config.output_format, "text");
        assert_eq!(config.timeout, 30);
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.base_url(), "https://api.datadoghq.com");
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut config = Config::default();
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "API key not set (DD_API_KEY)"
        );
        config.api_key = "api".to_string();
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "application key not set (DD_APP_KEY)"
        );
        config.app_key = "app".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_format() {
        let mut config = Config {
            output_format: "JSON".to_string(),
            ..valid()
        };
        config.validate().unwrap();
        assert_eq!(config.output_format, "json");

        let mut config = Config {
            output_format: "xml".to_string(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_levels() {
        let mut config = Config {
            log_level: "error, warn".to_string(),
            ..valid()
        };
        config.validate().unwrap();
        assert_eq!(config.log_levels, vec!["error", "warn"]);

        let mut config = Config {
            log_level: "error,fatal".to_string(),
            ..valid()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fatal"));
    }

    #[test]
    fn test_validate_numbers_and_site() {
        for mut config in [
            Config {
                timeout: 0,
                ..valid()
            },
            Config {
                retry_count: 0,
                ..valid()
            },
            Config {
                site: "  ".to_string(),
                ..valid()
            },
        ] {
            assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
        }
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = Config {
            api_key: "super-secret-api".to_string(),
            app_key: "super-secret-app".to_string(),
            ..Config::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_base_url_override() {
        let config = Config {
            api_url: Some("http://127.0.0.1:1234/".to_string()),
            site: "datadoghq.eu".to_string(),
            ..Config::default()
        };
        assert_eq!(config.base_url(), "http://127.0.0.1:1234");
        let config = Config {
            site: "datadoghq.eu".to_string(),
            ..Config::default()
        };
        assert_eq!(config.base_url(), "https://api.datadoghq.eu");
    }

    #[test]
    fn test_query_levels_fallback() {
        let mut config = Config {
            tags: "service:web".to_string(),
            log_level: "error,warn".to_string(),
            ..valid()
        };
        config.validate().unwrap();
        assert_eq!(config.query(), "service:web (status:error OR status:warn)");

        let config = Config {
            log_level: "info".to_string(),
            ..Config::default()
        };
        assert_eq!(config.query_levels(), vec!["info"]);
        assert_eq!(Config::default().query(), "");
    }

    #[test]
    fn test_flags_override_only_non_empty_values() {
        let mut config = Config {
            tags: "service:web".to_string(),
            ..Config::default()
        };
        let flags = FlagsConfigSource(PartialConfig {
            tags: Some(String::new()),
            output_format: Some("json".to_string()),
            ..PartialConfig::default()
        });
        flags.load(&mut config).unwrap();
        assert_eq!(config.tags, "service:web");
        assert_eq!(config.output_format, "json");
    }

    #[test]
    fn test_layering_yaml_env_flags() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "config.yaml",
                r#"
tags: "service:file"
log_level: "info"
output_format: "json"
timeout: 10
"#,
            )?;
            jail.set_env("DLT_LOG_LEVEL", "error");
            jail.set_env("DD_API_KEY", "env-api");
            jail.set_env("DD_APP_KEY", "env-app");
            jail.set_env("DD_SITE", "datadoghq.eu");

            let flags = PartialConfig {
                output_format: Some("text".to_string()),
                ..PartialConfig::default()
            };
            let mut config = get_config(Path::new("config.yaml"), flags);
            config.validate().unwrap();

            assert_eq!(config.tags, "service:file");
            assert_eq!(config.log_level, "error");
            assert_eq!(config.output_format, "text");
            assert_eq!(config.timeout, 10);
            assert_eq!(config.retry_count, 3);
            assert_eq!(config.api_key, "env-api");
            assert_eq!(config.app_key, "env-app");
            assert_eq!(config.site, "datadoghq.eu");
            Ok(())
        });
    }

    #[test]
    fn test_https_proxy_from_environment() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("HTTPS_PROXY", "http://proxy.local:3128");
            let config = get_config(Path::new("missing.yaml"), PartialConfig::default());
            assert_eq!(
                config.proxy_https.as_deref(),
                Some("http://proxy.local:3128")
            );
            Ok(())
        });
    }

    #[test]
    fn test_write_default_config() {
        figment::Jail::expect_with(|jail| {
            let path = jail.directory().join(".dlt").join("config.yaml");
            write_default_config(&path).unwrap();

            let written = std::fs::read_to_string(&path).unwrap();
            assert!(written.contains("output_format: \"text\""));

            let mut config = Config::default();
            YamlConfigSource { path: path.clone() }
                .load(&mut config)
                .unwrap();
            assert_eq!(config.tags, "service:web,env:production");
            assert_eq!(config.log_level, "info");

            let err = write_default_config(&path).unwrap_err();
            assert!(matches!(err, ConfigError::AlreadyExists(_)));
            assert!(err.to_string().starts_with("config file already exists: "));
            Ok(())
        });
    }
}
