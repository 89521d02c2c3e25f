// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Translation of CLI filters into Logs search query syntax.

/// Builds a search query from a comma-separated tag filter and a set of levels.
///
/// Tags are expected to already be in `key:value` form and are passed through
/// unescaped. Two or more levels become a parenthesised `OR` group.
///
/// ```
/// use dd_log_tail::query::build_query;
///
/// assert_eq!(
///     build_query("service:web, env:prod ", &["error", "warn"]),
///     "service:web env:prod (status:error OR status:warn)"
/// );
/// assert_eq!(build_query("", &["info"]), "status:info");
/// assert_eq!(build_query("", &[] as &[&str]), "");
/// ```
pub fn build_query<S: AsRef<str>>(tags: &str, levels: &[S]) -> String {
    let mut conditions: Vec<String> = tags
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect();

    let statuses: Vec<String> = levels
        .iter()
        .map(|level| level.as_ref().trim())
        .filter(|level| !level.is_empty())
        .map(|level| format!("status:{level}"))
        .collect();

    match statuses.len() {
        0 => {}
        1 => conditions.extend(statuses),
        _ => conditions.push(format!("({})", statuses.join(" OR "))),
    }

    conditions.join(" ")
}

/// Splits a raw level filter (`"error, warn"`) into its trimmed, non-empty parts.
pub fn split_levels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map(str::to_string)
        .collect()
}
