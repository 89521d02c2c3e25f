// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Real-time tail loop.
//!
//! [`PollState`] holds every piece of timing and cursor state and exposes one
//! transition per fetch outcome. [`TailEngine`] drives it: compute the window,
//! fetch, apply the outcome, emit, sleep. Each window starts one nanosecond
//! after the latest event already seen so consecutive windows never overlap.
//!
//! Two events sharing the exact same timestamp across a window boundary may be
//! skipped; the search API gives no tie-break ordering to do better.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::backoff::{calculate_backoff, RateLimitBackoff};
use crate::client::{FetchedLogs, LogSource};
use crate::error::{should_retry, FetchError, TailError};
use crate::format::Formatter;
use crate::sink::LineSink;

/// Starting poll interval.
pub const BASE_INTERVAL: Duration = Duration::from_secs(3);
pub const MIN_INTERVAL: Duration = Duration::from_secs(2);
pub const MAX_INTERVAL: Duration = Duration::from_secs(30);
/// Width of the first window, looking back from `now`.
pub const INITIAL_SEARCH_WINDOW: Duration = Duration::from_secs(30);

const MIN_SEARCH_WINDOW: Duration = Duration::from_secs(15);
const MAX_SEARCH_WINDOW: Duration = Duration::from_secs(60);
/// Successes in a row before the rate limit backoff is forgotten.
const RATE_LIMIT_RESET_SUCCESSES: u32 = 3;
/// Successes in a row before the interval may shrink.
const SPEED_UP_SUCCESSES: u32 = 5;
/// Entries in one response before the window may shrink.
const BUSY_RESPONSE_ENTRIES: usize = 5;
const SPEED_UP_FACTOR: f64 = 0.85;
const SLOW_DOWN_FACTOR: f64 = 1.05;
const WINDOW_SHRINK_FACTOR: f64 = 0.9;
const WINDOW_GROW_FACTOR: f64 = 1.1;
/// Cursor position after the first empty poll, behind `now`.
const IDLE_FIRST_LOOKBACK: Duration = Duration::from_secs(30);
/// Cursor position after later empty polls, behind `now`.
const IDLE_LOOKBACK: Duration = Duration::from_secs(10);

/// Polling cadence and cursor of a tail session.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    last_timestamp: Option<DateTime<Utc>>,
    retry_count: u32,
    max_retries: u32,
    current_interval: Duration,
    base_interval: Duration,
    min_interval: Duration,
    max_interval: Duration,
    search_window: Duration,
    rate_limit: RateLimitBackoff,
    consecutive_successes: u32,
}

impl PollState {
    /// A fresh session with no cursor yet.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use chrono::{TimeZone, Utc};
    /// use dd_log_tail::PollState;
    ///
    /// let state = PollState::new(3);
    /// assert_eq!(state.last_timestamp(), None);
    /// assert_eq!(state.current_interval(), Duration::from_secs(3));
    ///
    /// // Without a cursor the first window covers the last 30 seconds.
    /// let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 30).unwrap();
    /// let (from, to) = state.window(now);
    /// assert_eq!(to, now);
    /// assert_eq!((to - from).num_seconds(), 30);
    /// ```
    pub fn new(max_retries: u32) -> Self {
        Self {
            last_timestamp: None,
            retry_count: 0,
            max_retries,
            current_interval: BASE_INTERVAL,
            base_interval: BASE_INTERVAL,
            min_interval: MIN_INTERVAL,
            max_interval: MAX_INTERVAL,
            search_window: INITIAL_SEARCH_WINDOW,
            rate_limit: RateLimitBackoff::default(),
            consecutive_successes: 0,
        }
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    /// Consecutive failures since the last success.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    pub fn search_window(&self) -> Duration {
        self.search_window
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    /// Delay applied after the next rate limited poll.
    pub fn rate_limit_backoff(&self) -> Duration {
        self.rate_limit.current()
    }

    /// Window of the next fetch.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = match self.last_timestamp {
            Some(last) => last + chrono::Duration::nanoseconds(1),
            None => now - to_chrono(self.search_window),
        };
        (from, now)
    }

    /// Applies a rate limit answer and returns how long to wait before
    /// retrying the same window.
    pub fn on_rate_limited(&mut self) -> Duration {
        let wait = self.rate_limit.register_rate_limit();
        self.current_interval = self
            .current_interval
            .max(self.base_interval * 2)
            .min(self.max_interval);
        self.consecutive_successes = 0;
        wait
    }

    /// Applies a non rate limit failure. Returns the wait before the next
    /// attempt, or the fatal error once the retry ceiling is reached.
    pub fn on_failure(&mut self, error: FetchError) -> Result<Duration, TailError> {
        self.retry_count += 1;
        if self.retry_count >= self.max_retries {
            return Err(TailError::RetriesExhausted {
                attempts: self.max_retries,
                source: error,
            });
        }
        Ok(calculate_backoff(self.retry_count))
    }

    /// Applies a successful fetch of `count` entries whose latest event time
    /// is `latest`.
    pub fn on_success(&mut self, count: usize, latest: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.retry_count = 0;
        self.consecutive_successes += 1;
        if self.consecutive_successes >= RATE_LIMIT_RESET_SUCCESSES {
            self.rate_limit.reset();
        }

        if count > 0 {
            if self.consecutive_successes >= SPEED_UP_SUCCESSES {
                self.current_interval = self
                    .current_interval
                    .mul_f64(SPEED_UP_FACTOR)
                    .max(self.min_interval);
            }
            if count >= BUSY_RESPONSE_ENTRIES && self.search_window > MIN_SEARCH_WINDOW {
                self.search_window = self.search_window.mul_f64(WINDOW_SHRINK_FACTOR);
            }
        } else {
            self.current_interval = self
                .current_interval
                .mul_f64(SLOW_DOWN_FACTOR)
                .min(self.max_interval);
            if self.search_window < MAX_SEARCH_WINDOW {
                self.search_window = self.search_window.mul_f64(WINDOW_GROW_FACTOR);
            }
        }

        self.last_timestamp = advance_cursor(self.last_timestamp, count, latest, now);
    }
}

/// Next position of the dedup cursor after a successful fetch.
///
/// A newer `latest` is adopted. An empty response slides the cursor to just
/// behind `now` so that idle windows stay bounded, without ever moving it back
/// over events already emitted.
pub(crate) fn advance_cursor(
    last: Option<DateTime<Utc>>,
    count: usize,
    latest: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match (last, latest) {
        (Some(last), Some(latest)) => Some(last.max(latest)),
        (None, Some(latest)) => Some(latest),
        (None, None) if count == 0 => Some(now - to_chrono(IDLE_FIRST_LOOKBACK)),
        (Some(last), None) if count == 0 => Some(last.max(now - to_chrono(IDLE_LOOKBACK))),
        (last, None) => last,
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Sleeps for `duration` unless cancelled first. Returns `false` on
/// cancellation.
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

/// Drives a [`PollState`] against a [`LogSource`] and streams every entry to
/// a [`LineSink`].
pub struct TailEngine<S> {
    source: S,
    query: String,
    formatter: Formatter,
    state: PollState,
}

impl<S: LogSource> TailEngine<S> {
    pub fn new(source: S, query: String, formatter: Formatter, max_retries: u32) -> Self {
        Self {
            source,
            query,
            formatter,
            state: PollState::new(max_retries),
        }
    }

    /// Cadence and cursor as left by the last poll.
    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Polls until `cancel` fires (`Ok`) or the retry ceiling is reached.
    pub async fn run<K: LineSink>(
        &mut self,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<(), TailError> {
        debug!(query = %self.query, "Starting tail loop");
        loop {
            let (from, to) = self.state.window(Utc::now());

            let result = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                result = self.source.fetch_window(&self.query, from, to) => result,
            };

            let delay = match result {
                Ok(fetched) => {
                    self.handle_success(fetched, sink)?;
                    self.state.current_interval
                }
                Err(e) if e.is_rate_limit() => {
                    let wait = self.state.on_rate_limited();
                    warn!(
                        wait = ?wait,
                        interval = ?self.state.current_interval,
                        "Rate limit reached. Backing off for {:?}...",
                        wait
                    );
                    wait
                }
                Err(e) => {
                    let message = e.to_string();
                    let retryable = should_retry(&e);
                    match self.state.on_failure(e) {
                        Ok(wait) => {
                            warn!(
                                retryable,
                                "Failed to fetch logs (attempt {}/{}): {}. Retrying in {:?}...",
                                self.state.retry_count,
                                self.state.max_retries,
                                message,
                                wait
                            );
                            wait
                        }
                        Err(fatal) => {
                            error!("{}", fatal);
                            return Err(fatal);
                        }
                    }
                }
            };

            if !sleep_or_cancel(delay, cancel).await {
                return Ok(());
            }
        }
    }

    fn handle_success<K: LineSink>(
        &mut self,
        fetched: FetchedLogs,
        sink: &mut K,
    ) -> Result<(), TailError> {
        self.state
            .on_success(fetched.entries.len(), fetched.latest, Utc::now());
        debug!(
            count = fetched.entries.len(),
            interval = ?self.state.current_interval,
            window = ?self.state.search_window,
            "Poll succeeded"
        );

        for entry in &fetched.entries {
            match self.formatter.format(entry) {
                Ok(line) => sink.write_line(&line)?,
                Err(e) => warn!(id = %entry.id, "Failed to format log: {}", e),
            }
        }
        Ok(())
    }
}
