// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Polling client for the Datadog Logs search API.
//!
//! The crate turns a tag filter and a set of levels into a search query,
//! fetches matching events over advancing time windows, and renders them as
//! text or JSON lines. [`tail::TailEngine`] follows new events in real time,
//! [`batch::BatchEngine`] retrieves a fixed range page by page, and
//! [`live::LiveTail`] feeds the terminal panel.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod backoff;
pub mod batch;
pub mod client;
pub mod config;
pub mod entry;
pub mod error;
pub mod format;
pub mod http;
pub mod live;
pub mod logger;
pub mod query;
pub mod sink;
pub mod tail;

pub use batch::{parse_time_range, BatchEngine};
pub use client::{FetchedLogs, LogSource, LogsClient, Page};
pub use config::{Config, ConfigError};
pub use entry::LogEntry;
pub use error::{should_retry, FetchError, FormatError, TailError};
pub use format::Formatter;
pub use live::{FilterHandle, LiveLine, LiveTail, LiveUpdate};
pub use sink::{ConsoleSink, LineSink};
pub use tail::{PollState, TailEngine};
