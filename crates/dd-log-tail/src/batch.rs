// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One-shot retrieval of a fixed time range, following pagination cursors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::batch_rate_limit_delay;
use crate::client::LogSource;
use crate::entry::LogEntry;
use crate::error::TailError;
use crate::format::Formatter;
use crate::sink::LineSink;
use crate::tail::sleep_or_cancel;

/// Events requested per page.
pub const BATCH_PAGE_SIZE: u32 = 500;
/// Rate limited attempts on one page before the run is abandoned.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 5;
/// Pause between two successful page fetches.
pub const PAGE_DELAY: Duration = Duration::from_millis(500);
/// A progress message is logged every time this many entries have been read.
const PROGRESS_EVERY: usize = 500;

const RANGE_EXAMPLE: &str = "2024-01-15T10:00:00Z,2024-01-15T11:00:00Z";

/// Parses a `from,to` pair of RFC3339 timestamps.
///
/// Both bounds may carry surrounding whitespace and any UTC offset; the end
/// must fall strictly after the start.
///
/// # Examples
///
/// ```
/// use dd_log_tail::parse_time_range;
///
/// let (from, to) = parse_time_range("2024-01-15T10:00:00Z, 2024-01-15T12:00:00+01:00")?;
/// assert_eq!((to - from).num_hours(), 1);
///
/// assert!(parse_time_range("2024-01-15T10:00:00Z").is_err());
/// assert!(parse_time_range("2024-01-15T11:00:00Z,2024-01-15T10:00:00Z").is_err());
/// # Ok::<(), dd_log_tail::TailError>(())
/// ```
pub fn parse_time_range(raw: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), TailError> {
    let Some((from, to)) = raw.split_once(',') else {
        return Err(TailError::Validation(format!(
            "timestamp must be a time range in format: from,to (e.g. {RANGE_EXAMPLE})"
        )));
    };
    if to.contains(',') {
        return Err(TailError::Validation(format!(
            "invalid timestamp range format (use: from,to in RFC3339, e.g. {RANGE_EXAMPLE})"
        )));
    }

    let from = parse_bound(from, "start")?;
    let to = parse_bound(to, "end")?;
    if to <= from {
        return Err(TailError::Validation(
            "end timestamp must be after start timestamp".to_string(),
        ));
    }
    Ok((from, to))
}

fn parse_bound(raw: &str, which: &str) -> Result<DateTime<Utc>, TailError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            TailError::Validation(format!(
                "invalid {which} timestamp format (use RFC3339, e.g. 2024-01-15T10:00:00Z): {e}"
            ))
        })
}

/// Retrieves every page of a time range before emitting anything.
pub struct BatchEngine<S> {
    source: S,
    query: String,
    formatter: Formatter,
    page_size: u32,
    max_rate_limit_retries: u32,
    page_delay: Duration,
}

impl<S: LogSource> BatchEngine<S> {
    /// Creates an engine with the default page size, pacing and rate limit
    /// budget.
    pub fn new(source: S, query: String, formatter: Formatter) -> Self {
        Self {
            source,
            query,
            formatter,
            page_size: BATCH_PAGE_SIZE,
            max_rate_limit_retries: MAX_RATE_LIMIT_RETRIES,
            page_delay: PAGE_DELAY,
        }
    }

    /// Fetches all entries of `[from, to)` in page order. Returns `Ok(None)`
    /// when cancelled.
    pub async fn fetch_all(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<LogEntry>>, TailError> {
        if to <= from {
            return Err(TailError::Validation(
                "end timestamp must be after start timestamp".to_string(),
            ));
        }

        let mut entries = Vec::new();
        let mut cursor: Option<String> = None;
        let mut retries = 0u32;

        loop {
            let result = tokio::select! {
                () = cancel.cancelled() => return Ok(None),
                result = self.source.fetch_page(
                    &self.query,
                    from,
                    to,
                    cursor.as_deref(),
                    self.page_size,
                ) => result,
            };

            let page = match result {
                Ok(page) => page,
                Err(e) if e.is_rate_limit() => {
                    if retries >= self.max_rate_limit_retries {
                        return Err(TailError::RateLimitExhausted {
                            attempts: self.max_rate_limit_retries,
                            source: e,
                        });
                    }
                    let delay = batch_rate_limit_delay(retries);
                    retries += 1;
                    warn!(
                        "Rate limit reached. Retrying in {:?}... (attempt {}/{})",
                        delay, retries, self.max_rate_limit_retries
                    );
                    if !sleep_or_cancel(delay, cancel).await {
                        return Ok(None);
                    }
                    continue;
                }
                Err(e) => return Err(TailError::Fetch(e)),
            };

            retries = 0;
            entries.extend(page.entries);
            debug!(total = entries.len(), "Fetched batch page");

            let Some(next) = page.next_cursor else {
                break;
            };
            cursor = Some(next);

            if !entries.is_empty() && entries.len() % PROGRESS_EVERY == 0 {
                info!("Retrieved {} log entries so far...", entries.len());
            }

            if !sleep_or_cancel(self.page_delay, cancel).await {
                return Ok(None);
            }
        }

        Ok(Some(entries))
    }

    /// Fetches the range, then formats and writes every entry. Returns the
    /// number of entries retrieved.
    pub async fn run<K: LineSink>(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<usize, TailError> {
        let Some(entries) = self.fetch_all(from, to, cancel).await? else {
            return Ok(0);
        };

        for entry in &entries {
            match self.formatter.format(entry) {
                Ok(line) => sink.write_line(&line)?,
                Err(e) => warn!(id = %entry.id, "Failed to format log: {}", e),
            }
        }
        Ok(entries.len())
    }
}
