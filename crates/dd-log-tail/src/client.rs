// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logs search client.
//!
//! One call issues exactly one `POST /api/v2/logs/events/search`. Retry policy
//! lives in the engines, so every failure is returned to the caller as a
//! [`FetchError`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{Config, ConfigError};
use crate::entry::{first_non_empty, LogEntry, NO_MESSAGE};
use crate::error::FetchError;
use crate::http::{auth_headers, get_client, redact_headers};

/// Path of the search endpoint, relative to the API base URL.
pub const SEARCH_PATH: &str = "/api/v2/logs/events/search";
/// Page size of a tail poll.
pub const TAIL_PAGE_LIMIT: u32 = 100;

/// Result of a single-window fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedLogs {
    pub entries: Vec<LogEntry>,
    /// Latest event time of the response, `None` when nothing was returned.
    pub latest: Option<DateTime<Utc>>,
}

/// One page of a paginated fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub entries: Vec<LogEntry>,
    /// Cursor of the following page, `None` on the last page.
    pub next_cursor: Option<String>,
}

/// A searchable source of log events.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetches the first page of `[from, to)` sorted by timestamp.
    async fn fetch_window(
        &self,
        query: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<FetchedLogs, FetchError>;

    /// Fetches one page of `[from, to)`, starting at `cursor` when given.
    async fn fetch_page(
        &self,
        query: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page, FetchError>;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    filter: SearchFilter<'a>,
    page: SearchPage<'a>,
    sort: &'static str,
}

#[derive(Debug, Serialize)]
struct SearchFilter<'a> {
    from: String,
    to: String,
    query: &'a str,
}

#[derive(Debug, Serialize)]
struct SearchPage<'a> {
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    /// `null` and a missing array both mean no events.
    data: Option<Vec<RawLog>>,
    meta: Option<ResponseMeta>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponseMeta {
    page: Option<ResponsePage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponsePage {
    after: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLog {
    id: Option<String>,
    attributes: Option<RawLogAttributes>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLogAttributes {
    timestamp: Option<String>,
    message: Option<String>,
    content: Option<String>,
    text: Option<String>,
    log: Option<String>,
    service: Option<String>,
    host: Option<String>,
    status: Option<String>,
    level: Option<String>,
    tags: Option<Vec<String>>,
    attributes: Option<Map<String, Value>>,
}

impl SearchResponse {
    fn next_cursor(&self) -> Option<String> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.page.as_ref())
            .and_then(|page| page.after.clone())
            .filter(|after| !after.is_empty())
    }
}

impl RawLog {
    /// Normalises the raw event. The timestamp is `None` when missing or not
    /// RFC3339.
    fn into_entry(self) -> (LogEntry, Option<DateTime<Utc>>) {
        let attrs = self.attributes.unwrap_or_default();
        let parsed = attrs
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc));

        let mut entry = LogEntry::new(
            self.id.unwrap_or_default(),
            parsed.unwrap_or_default(),
        );
        entry.message = first_non_empty(&[
            text(&attrs.message),
            text(&attrs.content),
            text(&attrs.text),
            text(&attrs.log),
        ])
        .unwrap_or(NO_MESSAGE)
        .to_string();
        entry.service = first_non_empty(&[text(&attrs.service), text(&attrs.host)])
            .unwrap_or_default()
            .to_string();
        entry.status = first_non_empty(&[text(&attrs.status), text(&attrs.level)])
            .unwrap_or_default()
            .to_string();
        entry.tags = attrs.tags.unwrap_or_default();
        entry.attributes = attrs.attributes.unwrap_or_default();

        (entry, parsed)
    }
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

/// Formats a window bound, keeping sub-second precision only when present.
fn wire_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Client for the Datadog Logs search API.
#[derive(Debug, Clone)]
pub struct LogsClient {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl LogsClient {
    /// Builds a client for the configured site or URL override.
    ///
    /// Fails when the keys cannot be sent as headers or the HTTP client
    /// cannot be created.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let headers =
            auth_headers(&config.api_key, &config.app_key).map_err(ConfigError::Validation)?;
        Ok(Self {
            client: get_client(config),
            url: format!("{}{}", config.base_url(), SEARCH_PATH),
            headers,
        })
    }

    async fn search(
        &self,
        query: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<SearchResponse, FetchError> {
        let request = SearchRequest {
            filter: SearchFilter {
                from: wire_time(from),
                to: wire_time(to),
                query,
            },
            page: SearchPage { limit, cursor },
            sort: "timestamp",
        };

        debug!(
            url = %self.url,
            headers = ?redact_headers(&self.headers),
            query,
            from = %request.filter.from,
            to = %request.filter.to,
            "Sending logs search request"
        );

        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!(%status, body = %body, "Logs search request failed");
            return Err(FetchError::from_status(status, body));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl LogSource for LogsClient {
    async fn fetch_window(
        &self,
        query: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<FetchedLogs, FetchError> {
        let response = self
            .search(query, from, to, None, TAIL_PAGE_LIMIT)
            .await?;

        let mut fetched = FetchedLogs::default();
        for raw in response.data.unwrap_or_default() {
            let (entry, timestamp) = raw.into_entry();
            if timestamp > fetched.latest {
                fetched.latest = timestamp;
            }
            fetched.entries.push(entry);
        }
        debug!(
            count = fetched.entries.len(),
            latest = ?fetched.latest,
            "Fetched logs window"
        );
        Ok(fetched)
    }

    async fn fetch_page(
        &self,
        query: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page, FetchError> {
        let response = self.search(query, from, to, cursor, limit).await?;
        let next_cursor = response.next_cursor();
        let entries = response
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|raw| raw.into_entry().0)
            .collect::<Vec<_>>();
        debug!(
            count = entries.len(),
            has_next = next_cursor.is_some(),
            "Fetched logs page"
        );
        Ok(Page {
            entries,
            next_cursor,
        })
    }
}
