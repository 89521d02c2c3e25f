// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared by the fetcher and both polling engines.
//!
//! A single search request fails with a [`FetchError`]. The engines classify
//! those errors and only surface a [`TailError`] when a policy decides the run
//! cannot continue (retry ceiling reached, bad input, broken output).

use reqwest::StatusCode;

/// Failure of one search request.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network-level failure (timeout, connection refused, DNS, TLS).
    #[error("failed to execute HTTP request: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered `429 Too Many Requests`.
    #[error("API error: 429 Too Many Requests - {body}")]
    RateLimited { body: String },

    /// Any other non-2xx answer.
    #[error("API error: {status} - {body}")]
    Api { status: StatusCode, body: String },

    /// The response body was not the expected JSON document.
    #[error("failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// Builds the error matching a non-success status.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            FetchError::RateLimited { body }
        } else {
            FetchError::Api { status, body }
        }
    }

    /// Whether this failure is the provider's rate limit signal.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            FetchError::Api { status, .. } => Some(*status),
            FetchError::Transport(err) => err.status(),
            FetchError::Decode(_) => None,
        }
    }
}

/// Returns whether a failed fetch is worth another attempt.
///
/// Transport failures, 5xx answers, rate limits and undecodable bodies are
/// transient. Other 4xx answers (bad credentials, bad query) are not.
pub fn should_retry(error: &FetchError) -> bool {
    match error {
        FetchError::Transport(_) | FetchError::RateLimited { .. } | FetchError::Decode(_) => true,
        FetchError::Api { status, .. } => status.is_server_error(),
    }
}

/// Fatal outcome of a tail or batch run.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("{0}")]
    Validation(String),

    #[error("maximum retry count ({attempts}) reached: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("maximum retry count reached due to rate limiting ({attempts} attempts): {source}")]
    RateLimitExhausted {
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("failed to fetch logs: {0}")]
    Fetch(#[source] FetchError),

    #[error("failed to write output: {0}")]
    Sink(#[from] std::io::Error),
}

/// Failure to render a single entry.
#[derive(Debug, thiserror::Error)]
#[error("failed to marshal log to JSON: {0}")]
pub struct FormatError(#[from] pub serde_json::Error);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_classified_from_status() {
        let error = FetchError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        assert!(error.is_rate_limit());
        assert!(error.to_string().contains("429"));
        assert_eq!(error.status(), Some(StatusCode::TOO_MANY_REQUESTS));
    }

    #[test]
    fn test_api_error_display_carries_status_and_body() {
        let error = FetchError::from_status(StatusCode::FORBIDDEN, "{\"errors\":[\"Forbidden\"]}".into());
        assert!(!error.is_rate_limit());
        assert_eq!(
            error.to_string(),
            "API error: 403 Forbidden - {\"errors\":[\"Forbidden\"]}"
        );
    }

    #[test]
    fn test_should_retry() {
        assert!(should_retry(&FetchError::from_status(
            StatusCode::TOO_MANY_REQUESTS,
            String::new()
        )));
        assert!(should_retry(&FetchError::from_status(
            StatusCode::BAD_GATEWAY,
            String::new()
        )));
        assert!(!should_retry(&FetchError::from_status(
            StatusCode::UNAUTHORIZED,
            String::new()
        )));
        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(should_retry(&FetchError::Decode(decode)));
    }

    #[test]
    fn test_tail_error_display() {
        let error = TailError::RetriesExhausted {
            attempts: 3,
            source: FetchError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom".into()),
        };
        assert_eq!(
            error.to_string(),
            "maximum retry count (3) reached: API error: 500 Internal Server Error - boom"
        );
    }
}
