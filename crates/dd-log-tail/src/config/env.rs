// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use figment::{providers::Env, Figment};

use crate::config::{Config, ConfigError, ConfigSource, PartialConfig};

/// Credential variables shared with the other Datadog tools. They are read
/// verbatim so that keys made only of digits are not coerced into numbers.
const API_KEY_VAR: &str = "DD_API_KEY";
const APP_KEY_VAR: &str = "DD_APP_KEY";
const SITE_VAR: &str = "DD_SITE";

/// Reads `DLT_<KEY>` variables for every configuration key, then the
/// `DD_API_KEY`, `DD_APP_KEY` and `DD_SITE` variables.
#[derive(Debug, Default, Clone, Copy)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Env::prefixed("DLT_"));
        let env_config: PartialConfig = figment.extract().map_err(|e| {
            ConfigError::Parse(format!(
                "Failed to parse config from environment variables: {e}, using default config."
            ))
        })?;
        env_config.apply(config);

        let credentials = PartialConfig {
            api_key: std::env::var(API_KEY_VAR).ok(),
            app_key: std::env::var(APP_KEY_VAR).ok(),
            site: std::env::var(SITE_VAR).ok(),
            ..PartialConfig::default()
        };
        credentials.apply(config);

        Ok(())
    }
}
