// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction.
//!
//! The client carries the request timeout from the configuration, a pooled
//! connection with TCP keep-alive, and the optional HTTPS proxy. An invalid
//! proxy URL never prevents tailing: the client falls back to a direct
//! connection and logs the problem.

use std::error::Error;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use tracing::error;

use crate::config::Config;

/// Header carrying the Datadog API key.
pub const API_KEY_HEADER: &str = "DD-API-KEY";
/// Header carrying the Datadog application key.
pub const APPLICATION_KEY_HEADER: &str = "DD-APPLICATION-KEY";

const SENSITIVE_HEADERS: [&str; 3] = ["dd-api-key", "dd-application-key", "authorization"];

/// Creates the HTTP client used for every search request.
#[must_use]
pub fn get_client(config: &Config) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(config: &Config, allow_proxy: bool) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(Duration::from_secs(config.timeout))
        .connect_timeout(Duration::from_secs(config.timeout))
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .user_agent(concat!("dlt/", env!("CARGO_PKG_VERSION")));

    if allow_proxy {
        if let Some(https_uri) = &config.proxy_https {
            client = client.proxy(reqwest::Proxy::https(https_uri.clone())?);
        }
    }

    Ok(client.build()?)
}

/// Builds the static headers sent with every search request.
pub fn auth_headers(api_key: &str, app_key: &str) -> Result<HeaderMap, String> {
    let mut headers = HeaderMap::new();
    headers.insert(
        API_KEY_HEADER,
        HeaderValue::from_str(api_key).map_err(|_| "API key is not a valid header value")?,
    );
    headers.insert(
        APPLICATION_KEY_HEADER,
        HeaderValue::from_str(app_key)
            .map_err(|_| "application key is not a valid header value")?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// Returns a redacted view of request headers suitable for debug logging.
pub fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| *name != USER_AGENT)
        .map(|(name, value)| {
            let lower = name.as_str().to_ascii_lowercase();
            let display = if SENSITIVE_HEADERS.contains(&lower.as_str()) {
                "<redacted>".to_string()
            } else {
                value
                    .to_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| "<non-utf8>".to_string())
            };
            (lower, display)
        })
        .collect()
}
