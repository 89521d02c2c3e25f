// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rendering of a [`LogEntry`] to a single output line.

use std::fmt;

use chrono::Local;

use crate::entry::LogEntry;
use crate::error::FormatError;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Formatter {
    /// `[time] [STATUS] [service] message [tags]`
    #[default]
    Text,
    /// One JSON document per line.
    Json,
}

impl Formatter {
    /// Selects the formatter for a configured format name. Unknown names
    /// fall back to plain text.
    ///
    /// # Examples
    ///
    /// ```
    /// use dd_log_tail::Formatter;
    ///
    /// assert_eq!(Formatter::from_name(" JSON "), Formatter::Json);
    /// assert_eq!(Formatter::from_name("yaml"), Formatter::Text);
    /// ```
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("json") {
            Formatter::Json
        } else {
            Formatter::Text
        }
    }

    /// Renders `entry` as one line without a trailing newline.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{DateTime, Utc};
    /// use dd_log_tail::{Formatter, LogEntry};
    ///
    /// let mut entry = LogEntry::new("AAA", DateTime::<Utc>::UNIX_EPOCH);
    /// entry.message = "connection reset".to_string();
    /// entry.service = "web".to_string();
    /// entry.status = "error".to_string();
    ///
    /// let line = Formatter::Text.format(&entry)?;
    /// assert!(line.ends_with("[ERROR] [web] connection reset"));
    ///
    /// let json: serde_json::Value = serde_json::from_str(&Formatter::Json.format(&entry)?)?;
    /// assert_eq!(json["id"], "AAA");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn format(&self, entry: &LogEntry) -> Result<String, FormatError> {
        match self {
            Formatter::Json => Ok(serde_json::to_string(entry)?),
            Formatter::Text => Ok(format_text(entry)),
        }
    }
}

impl fmt::Display for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formatter::Text => write!(f, "text"),
            Formatter::Json => write!(f, "json"),
        }
    }
}

fn format_text(entry: &LogEntry) -> String {
    let timestamp = entry.timestamp.with_timezone(&Local).format(TIME_FORMAT);
    let mut line = format!(
        "[{}] [{}] [{}] {}",
        timestamp,
        entry.status.to_uppercase(),
        entry.service,
        entry.message
    );
    if !entry.tags.is_empty() {
        line.push_str(&format!(" [{}]", entry.tags.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry() -> LogEntry {
        let mut entry = LogEntry::new("id-1", Utc.timestamp_opt(1_642_694_400, 0).unwrap());
        entry.message = "Test message".to_string();
        entry.service = "test-service".to_string();
        entry.status = "info".to_string();
        entry
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Formatter::from_name("json"), Formatter::Json);
        assert_eq!(Formatter::from_name("JSON"), Formatter::Json);
        assert_eq!(Formatter::from_name("text"), Formatter::Text);
        assert_eq!(Formatter::from_name("xml"), Formatter::Text);
        assert_eq!(Formatter::from_name(""), Formatter::Text);
    }

    #[test]
    fn test_text_without_tags() {
        let line = Formatter::Text.format(&entry()).unwrap();
        let expected_time = entry()
            .timestamp
            .with_timezone(&Local)
            .format(TIME_FORMAT)
            .to_string();
        assert_eq!(
            line,
            format!("[{expected_time}] [INFO] [test-service] Test message")
        );
        assert!(!line.ends_with("[]"));
    }

    #[test]
    fn test_text_with_tags() {
        let mut entry = entry();
        entry.tags = vec!["env:test".to_string(), "version:1.0".to_string()];
        let line = Formatter::Text.format(&entry).unwrap();
        assert!(line.ends_with("Test message [env:test, version:1.0]"));
    }

    #[test]
    fn test_json_fields() {
        let mut entry = entry();
        entry.tags = vec!["env:test".to_string()];
        let line = Formatter::Json.format(&entry).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["id"], "id-1");
        assert_eq!(value["timestamp"], 1_642_694_400);
        assert_eq!(value["service"], "test-service");
        assert_eq!(value["status"], "info");
        assert_eq!(value["tags"], serde_json::json!(["env:test"]));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_formatting_is_idempotent() {
        let entry = entry();
        for formatter in [Formatter::Text, Formatter::Json] {
            assert_eq!(
                formatter.format(&entry).unwrap(),
                formatter.format(&entry).unwrap()
            );
        }
    }
}
