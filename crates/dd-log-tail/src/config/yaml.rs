// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! YAML file configuration.
//!
//! ```yaml
//! tags: "service:web,env:production"
//! log_level: "info"
//! output_format: "text"
//! timeout: 30
//! retry_count: 3
//! ```
//!
//! Credentials may also live in the file (`api_key`, `app_key`, `site`), but
//! the environment variables take precedence.

use std::path::PathBuf;

use figment::{
    providers::{Format, Yaml},
    Figment,
};

use crate::config::{Config, ConfigError, ConfigSource, PartialConfig};

/// Loads a YAML file. A missing file contributes nothing.
#[derive(Debug, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct YamlConfigSource {
    pub path: PathBuf,
}

impl ConfigSource for YamlConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Yaml::file(self.path.clone()));

        match figment.extract::<PartialConfig>() {
            Ok(yaml_config) => yaml_config.apply(config),
            Err(e) => {
                return Err(ConfigError::Parse(format!(
                    "Failed to parse config from yaml file: {e}, using default config."
                )));
            }
        }

        Ok(())
    }
}
