// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dd_log_tail::{FetchError, FetchedLogs, LogEntry, LogSource, Page};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

/// Window and cursor of one recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub cursor: Option<String>,
}

/// Builds the response of one tail poll from the requested window.
pub type WindowStep = Box<dyn Fn(DateTime<Utc>, DateTime<Utc>) -> Result<FetchedLogs, FetchError> + Send>;

/// A [`LogSource`] replaying a fixed script. Once the script is exhausted it
/// cancels `done` and never answers again.
pub struct ScriptedSource {
    windows: Mutex<VecDeque<WindowStep>>,
    pages: Mutex<VecDeque<Result<Page, FetchError>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    done: CancellationToken,
}

impl ScriptedSource {
    pub fn new(done: CancellationToken) -> Self {
        Self {
            windows: Mutex::new(VecDeque::new()),
            pages: Mutex::new(VecDeque::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
            done,
        }
    }

    pub fn window(self, step: WindowStep) -> Self {
        self.windows.lock().unwrap().push_back(step);
        self
    }

    pub fn page(self, page: Result<Page, FetchError>) -> Self {
        self.pages.lock().unwrap().push_back(page);
        self
    }

    /// Shared handle on the recorded calls, readable after the source has
    /// moved into an engine.
    pub fn recorder(&self) -> Arc<Mutex<Vec<Call>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl LogSource for ScriptedSource {
    async fn fetch_window(
        &self,
        _query: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<FetchedLogs, FetchError> {
        self.calls.lock().unwrap().push(Call {
            from,
            to,
            cursor: None,
        });
        let step = self.windows.lock().unwrap().pop_front();
        match step {
            Some(step) => step(from, to),
            None => {
                self.done.cancel();
                std::future::pending().await
            }
        }
    }

    async fn fetch_page(
        &self,
        _query: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cursor: Option<&str>,
        _limit: u32,
    ) -> Result<Page, FetchError> {
        self.calls.lock().unwrap().push(Call {
            from,
            to,
            cursor: cursor.map(str::to_string),
        });
        let page = self.pages.lock().unwrap().pop_front();
        match page {
            Some(page) => page,
            None => {
                self.done.cancel();
                std::future::pending().await
            }
        }
    }
}

/// `count` entries spread one millisecond apart right after `from`.
pub fn entries_after(prefix: &str, from: DateTime<Utc>, count: usize) -> FetchedLogs {
    let entries: Vec<LogEntry> = (0..count)
        .map(|i| {
            let offset = chrono::Duration::milliseconds(i as i64 + 1);
            let mut entry = LogEntry::new(format!("{prefix}{i}"), from + offset);
            entry.message = format!("message {prefix}{i}");
            entry.service = "web".to_string();
            entry.status = "info".to_string();
            entry
        })
        .collect();
    let latest = entries.last().map(|entry| entry.timestamp);
    FetchedLogs { entries, latest }
}

pub fn page_of(prefix: &str, count: usize, next: Option<&str>) -> Page {
    let base = DateTime::<Utc>::default();
    Page {
        entries: (0..count)
            .map(|i| LogEntry::new(format!("{prefix}{i}"), base))
            .collect(),
        next_cursor: next.map(str::to_string),
    }
}

pub fn rate_limited() -> FetchError {
    FetchError::from_status(StatusCode::TOO_MANY_REQUESTS, "rate limited".to_string())
}

pub fn server_error() -> FetchError {
    FetchError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string())
}
