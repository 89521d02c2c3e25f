// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background poller feeding the terminal panel.
//!
//! The panel owns the filter text and may replace it at any time through a
//! [`FilterHandle`]; the poller reads it once per tick. Every replacement
//! resets the dedup cursor and bumps a generation counter kept under the same
//! lock as the cursor. A fetch started under an older generation is dropped
//! when it completes, and every [`LiveUpdate`] carries the generation it was
//! fetched under so the panel can ignore updates already in flight.
//!
//! Lock order is cursor, then filter.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::LogSource;
use crate::format::Formatter;
use crate::query::build_query;
use crate::tail::{advance_cursor, sleep_or_cancel};

/// Fixed delay between two panel polls.
pub const LIVE_TICK: Duration = Duration::from_secs(3);
/// Window of the first poll, and of the first poll after a filter change.
pub const LIVE_INITIAL_LOOKBACK: Duration = Duration::from_secs(60);

/// A formatted entry with the level used to colour it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveLine {
    pub level: String,
    pub text: String,
}

/// Outcome of one panel poll, tagged with the filter generation it was
/// fetched under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveUpdate {
    /// Entries of one window, in API order.
    Lines {
        generation: u64,
        lines: Vec<LiveLine>,
    },
    /// The fetch failed; the cursor did not move.
    Error { generation: u64, message: String },
}

impl LiveUpdate {
    /// Filter generation the update was fetched under.
    pub fn generation(&self) -> u64 {
        match self {
            LiveUpdate::Lines { generation, .. } | LiveUpdate::Error { generation, .. } => {
                *generation
            }
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, LiveUpdate::Lines { lines, .. } if lines.is_empty())
    }
}

#[derive(Debug, Default)]
struct CursorState {
    last: Option<DateTime<Utc>>,
    generation: u64,
}

/// Shared view of the panel filter and the poller cursor.
///
/// Cloning is cheap; every clone observes the same state.
#[derive(Debug, Clone)]
pub struct FilterHandle {
    filter: Arc<RwLock<String>>,
    cursor: Arc<Mutex<CursorState>>,
}

impl FilterHandle {
    /// Creates a handle holding `filter`, generation 0 and no cursor.
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: Arc::new(RwLock::new(filter.into())),
            cursor: Arc::new(Mutex::new(CursorState::default())),
        }
    }

    fn lock_cursor(&self) -> MutexGuard<'_, CursorState> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the filter text, forgets the cursor and starts a new
    /// generation. Returns the new generation.
    pub fn set(&self, filter: &str) -> u64 {
        let mut cursor = self.lock_cursor();
        *self.filter.write().unwrap_or_else(PoisonError::into_inner) = filter.to_string();
        cursor.last = None;
        cursor.generation = cursor.generation.wrapping_add(1);
        cursor.generation
    }

    /// Current filter text.
    pub fn filter(&self) -> String {
        self.filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest event time seen under the current filter.
    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.lock_cursor().last
    }

    /// Number of filter replacements so far.
    pub fn generation(&self) -> u64 {
        self.lock_cursor().generation
    }
}

/// What one poll needs, captured atomically.
struct Snapshot {
    generation: u64,
    filter: String,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

/// Polls a [`LogSource`] on a fixed tick for the terminal panel.
///
/// Unlike [`crate::tail::TailEngine`], the cadence never adapts and failures
/// are reported to the panel instead of ending the loop.
pub struct LiveTail<S> {
    source: S,
    levels: Vec<String>,
    formatter: Formatter,
    handle: FilterHandle,
    tick: Duration,
}

impl<S: LogSource> LiveTail<S> {
    /// Creates a poller for `levels`, starting with the tag `filter`.
    pub fn new(source: S, levels: Vec<String>, formatter: Formatter, filter: String) -> Self {
        Self {
            source,
            levels,
            formatter,
            handle: FilterHandle::new(filter),
            tick: LIVE_TICK,
        }
    }

    /// Handle through which the panel edits the filter.
    pub fn handle(&self) -> FilterHandle {
        self.handle.clone()
    }

    fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        let cursor = self.handle.lock_cursor();
        let filter = self
            .handle
            .filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let from = match cursor.last {
            Some(last) => last + chrono::Duration::nanoseconds(1),
            None => {
                now - chrono::Duration::from_std(LIVE_INITIAL_LOOKBACK)
                    .unwrap_or(chrono::Duration::MAX)
            }
        };
        Snapshot {
            generation: cursor.generation,
            filter,
            from,
            to: now,
        }
    }

    /// Runs a single fetch over the window following the cursor.
    ///
    /// When the filter changes while the fetch is in flight, the result is
    /// dropped, the cursor is left as the panel reset it, and an empty
    /// update is returned.
    pub async fn poll_once(&self) -> LiveUpdate {
        let snapshot = self.snapshot(Utc::now());
        let generation = snapshot.generation;
        let query = build_query(&snapshot.filter, &self.levels);

        let result = self
            .source
            .fetch_window(&query, snapshot.from, snapshot.to)
            .await;

        let fetched = {
            let mut cursor = self.handle.lock_cursor();
            if cursor.generation != generation {
                debug!(
                    fetched = generation,
                    current = cursor.generation,
                    "Filter changed during fetch, dropping results"
                );
                return LiveUpdate::Lines {
                    generation,
                    lines: Vec::new(),
                };
            }
            match result {
                Ok(fetched) => {
                    cursor.last = advance_cursor(
                        cursor.last,
                        fetched.entries.len(),
                        fetched.latest,
                        Utc::now(),
                    );
                    fetched
                }
                Err(e) => {
                    warn!("Failed to fetch logs: {}", e);
                    return LiveUpdate::Error {
                        generation,
                        message: e.to_string(),
                    };
                }
            }
        };

        let lines = fetched
            .entries
            .iter()
            .filter_map(|entry| match self.formatter.format(entry) {
                Ok(text) => Some(LiveLine {
                    level: entry.status.clone(),
                    text,
                }),
                Err(e) => {
                    warn!(id = %entry.id, "Failed to format log: {}", e);
                    None
                }
            })
            .collect();
        LiveUpdate::Lines { generation, lines }
    }

    /// Polls every tick until cancelled or the receiver goes away. Empty
    /// updates are not sent.
    pub async fn run(self, updates: mpsc::Sender<LiveUpdate>, cancel: CancellationToken) {
        loop {
            let update = tokio::select! {
                () = cancel.cancelled() => break,
                update = self.poll_once() => update,
            };
            if !update.is_empty() && updates.send(update).await.is_err() {
                break;
            }
            if !sleep_or_cancel(self.tick, &cancel).await {
                break;
            }
        }
        debug!("Live tail stopped");
    }
}
