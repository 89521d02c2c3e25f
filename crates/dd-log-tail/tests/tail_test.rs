// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{entries_after, rate_limited, server_error, ScriptedSource};
use dd_log_tail::{FetchedLogs, Formatter, TailEngine, TailError};
use tokio_util::sync::CancellationToken;

fn ids(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["id"].as_str().unwrap().to_string()
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_tail_survives_idle_poll_and_rate_limit() {
    let cancel = CancellationToken::new();
    let source = ScriptedSource::new(cancel.clone())
        .window(Box::new(|from, _| Ok(entries_after("a", from, 5))))
        .window(Box::new(|_, _| Ok(FetchedLogs::default())))
        .window(Box::new(|_, _| Err(rate_limited())))
        .window(Box::new(|from, _| Ok(entries_after("b", from, 2))));

    let mut engine = TailEngine::new(source, "service:web".to_string(), Formatter::Json, 3);
    let mut lines: Vec<String> = Vec::new();
    engine.run(&mut lines, &cancel).await.unwrap();

    let emitted = ids(&lines);
    assert_eq!(emitted, ["a0", "a1", "a2", "a3", "a4", "b0", "b1"]);
    assert_eq!(emitted.iter().collect::<HashSet<_>>().len(), 7);

    let state = engine.state();
    // The rate limit raised the interval to twice the base and the single
    // success that followed did not bring it down again.
    assert_eq!(state.current_interval(), Duration::from_secs(6));
    assert_eq!(state.consecutive_successes(), 1);
    assert_eq!(state.retry_count(), 0);
    assert_eq!(state.rate_limit_backoff(), Duration::from_millis(7500));
    // 30s shrunk once for the busy poll, then widened once for the idle one.
    assert!((state.search_window().as_secs_f64() - 29.7).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_tail_windows_never_overlap() {
    let cancel = CancellationToken::new();
    let source = ScriptedSource::new(cancel.clone())
        .window(Box::new(|from, _| Ok(entries_after("a", from, 3))))
        .window(Box::new(|_, _| Err(rate_limited())))
        .window(Box::new(|from, _| Ok(entries_after("b", from, 1))))
        .window(Box::new(|from, _| Ok(entries_after("c", from, 2))));

    let recorder = source.recorder();

    let mut engine = TailEngine::new(source, String::new(), Formatter::Json, 3);
    let mut lines: Vec<String> = Vec::new();
    engine.run(&mut lines, &cancel).await.unwrap();

    assert_eq!(ids(&lines), ["a0", "a1", "a2", "b0", "c0", "c1"]);

    // Calls: a, 429, b (same start as the rate limited one), c, then the
    // call that finds the script exhausted.
    let calls = recorder.lock().unwrap().clone();
    assert_eq!(calls.len(), 5);
    assert_eq!(calls[0].to - calls[0].from, chrono::Duration::seconds(30));
    assert_eq!(calls[1].from, calls[2].from);
    for pair in calls.windows(2) {
        assert!(pair[1].from >= pair[0].from);
    }
    assert!(calls[1].from > calls[0].from + chrono::Duration::milliseconds(2));
    assert!(calls[3].from > calls[2].from);
}

#[tokio::test(start_paused = true)]
async fn test_tail_stops_after_retry_ceiling() {
    let cancel = CancellationToken::new();
    let source = ScriptedSource::new(cancel.clone())
        .window(Box::new(|from, _| Ok(entries_after("a", from, 1))))
        .window(Box::new(|_, _| Err(server_error())))
        .window(Box::new(|_, _| Err(server_error())))
        .window(Box::new(|_, _| Err(server_error())));

    let mut engine = TailEngine::new(source, String::new(), Formatter::Text, 3);
    let mut lines: Vec<String> = Vec::new();
    let err = engine.run(&mut lines, &cancel).await.unwrap_err();

    assert!(matches!(err, TailError::RetriesExhausted { attempts: 3, .. }));
    assert!(err.to_string().contains("maximum retry count (3) reached"));
    assert_eq!(lines.len(), 1);
    assert!(!cancel.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_tail_recovers_before_retry_ceiling() {
    let cancel = CancellationToken::new();
    let source = ScriptedSource::new(cancel.clone())
        .window(Box::new(|_, _| Err(server_error())))
        .window(Box::new(|_, _| Err(server_error())))
        .window(Box::new(|from, _| Ok(entries_after("a", from, 1))))
        .window(Box::new(|_, _| Err(server_error())));

    let mut engine = TailEngine::new(source, String::new(), Formatter::Json, 3);
    let mut lines: Vec<String> = Vec::new();
    engine.run(&mut lines, &cancel).await.unwrap();

    assert_eq!(ids(&lines), ["a0"]);
    assert_eq!(engine.state().retry_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_tail_cancelled_during_sleep() {
    let cancel = CancellationToken::new();
    let source = ScriptedSource::new(CancellationToken::new())
        .window(Box::new(|from, _| Ok(entries_after("a", from, 2))));

    let mut engine = TailEngine::new(source, String::new(), Formatter::Json, 3);
    let stop = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.cancel();
    });

    let mut lines: Vec<String> = Vec::new();
    engine.run(&mut lines, &cancel).await.unwrap();
    assert_eq!(ids(&lines), ["a0", "a1"]);
}
