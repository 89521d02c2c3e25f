// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Placeholder used when a log carries none of the known message fields.
pub const NO_MESSAGE: &str = "No message content";

/// A log event normalised from one search result.
///
/// Entries are built fresh for every response and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: String,
    /// Event time. Kept at nanosecond precision for window arithmetic but
    /// serialised as Unix seconds.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub service: String,
    pub status: String,
    pub tags: Vec<String>,
    pub attributes: Map<String, Value>,
}

impl LogEntry {
    /// An entry with empty fields apart from its id and timestamp.
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            message: NO_MESSAGE.to_string(),
            service: String::new(),
            status: String::new(),
            tags: Vec::new(),
            attributes: Map::new(),
        }
    }
}

/// Returns the first candidate that is non-empty.
pub(crate) fn first_non_empty<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|value| !value.is_empty())
}
