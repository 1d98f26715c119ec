//! Dashboard usage analysis over dashboard service access logs.
//!
//! The dashboard service has no usage API, so usage is reconstructed from the
//! access-log lines it ships to the log store whenever a dashboard is read
//! through the API or opened in the UI.

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use dashprune_core::{AppError, AppResult};
use dashprune_domain::{DashboardKey, LabelSelector, LogEntry, UsageRecord, UsageTally};
use tracing::debug;

use crate::log_range_reader::LogRangeReader;

/// Stream label holding the requested URL path.
pub const PATH_LABEL: &str = "path";

/// Stream label holding the requesting user's login.
pub const USERNAME_LABEL: &str = "uname";

/// Default lower bound on log entries before usage is trusted.
pub const DEFAULT_LOWER_THRESHOLD: usize = 10;

/// Default size of one query window.
pub const DEFAULT_CHUNK_SIZE: TimeDelta = TimeDelta::hours(4);

const ACCESS_LOG_FILTERS: &str = r#"
|= "/apis/dashboard.grafana.app/"
|= "/namespaces/"
|= "/dashboards/"
|= "Request Completed"
| logfmt
| method = "GET"
| handler = "/apis/*""#;

/// Options for one usage analysis.
#[derive(Debug, Clone, Default)]
pub struct UsedDashboardsOptions {
    /// Users whose reads are ignored entirely. Case-sensitive.
    ///
    /// A dashboard read only by ignored users is considered unused.
    pub ignored_users: Vec<String>,
    /// Size of each query window. `None` or zero selects four hours.
    pub chunk_size: Option<TimeDelta>,
    /// Minimum number of log entries required across the whole range.
    ///
    /// `None` or zero selects ten. The guard exists so a change in the
    /// dashboard service's log format fails the analysis instead of
    /// reporting every dashboard as unused.
    pub lower_threshold: Option<i64>,
}

impl UsedDashboardsOptions {
    fn resolved_chunk_size(&self) -> AppResult<TimeDelta> {
        match self.chunk_size {
            Some(chunk_size) if chunk_size < TimeDelta::zero() => Err(AppError::Validation(
                format!("chunk size must be zero or greater, got {chunk_size}"),
            )),
            Some(chunk_size) if chunk_size > TimeDelta::zero() => Ok(chunk_size),
            _ => Ok(DEFAULT_CHUNK_SIZE),
        }
    }

    fn resolved_lower_threshold(&self) -> AppResult<usize> {
        match self.lower_threshold {
            None | Some(0) => Ok(DEFAULT_LOWER_THRESHOLD),
            Some(threshold) => usize::try_from(threshold).map_err(|_| {
                AppError::Validation(format!(
                    "lower threshold must be zero or greater, got {threshold}"
                ))
            }),
        }
    }
}

/// Builds the log query selecting dashboard read access logs.
#[must_use]
pub fn dashboard_access_query(selector: &LabelSelector) -> String {
    format!("{selector}{ACCESS_LOG_FILTERS}")
}

/// Application service reconstructing per-dashboard usage from access logs.
#[derive(Clone)]
pub struct UsageService {
    reader: LogRangeReader,
}

impl UsageService {
    /// Creates a usage service.
    #[must_use]
    pub fn new(reader: LogRangeReader) -> Self {
        Self { reader }
    }

    /// Returns usage over `[now - lookback, now)`.
    pub async fn used_dashboards(
        &self,
        selector: &LabelSelector,
        lookback: TimeDelta,
        options: &UsedDashboardsOptions,
    ) -> AppResult<Vec<UsageRecord>> {
        if lookback <= TimeDelta::zero() {
            return Err(AppError::Validation(format!(
                "lookback period must be greater than zero, got {lookback}"
            )));
        }

        let end = Utc::now();
        let start = end.checked_sub_signed(lookback).ok_or_else(|| {
            AppError::Validation(format!(
                "lookback period {lookback} reaches before the earliest supported time"
            ))
        })?;
        self.used_dashboards_between(selector, start, end, options)
            .await
    }

    /// Returns usage over `[start, end)`, sorted by dashboard name, then namespace.
    ///
    /// The range is read in sequential windows of `chunk_size`. Every entry
    /// must carry a parsable dashboard path, otherwise the whole analysis
    /// fails: usage data is never partially trusted.
    pub async fn used_dashboards_between(
        &self,
        selector: &LabelSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &UsedDashboardsOptions,
    ) -> AppResult<Vec<UsageRecord>> {
        let chunk_size = options
            .resolved_chunk_size()
            .map_err(|error| error.context("invalid options"))?;
        let lower_threshold = options
            .resolved_lower_threshold()
            .map_err(|error| error.context("invalid options"))?;
        let ignored_users: HashSet<&str> =
            options.ignored_users.iter().map(String::as_str).collect();

        let query = dashboard_access_query(selector);
        let entries = self.read_chunked(&query, start, end, chunk_size).await?;

        if entries.len() < lower_threshold {
            return Err(AppError::UnsafeUsageSample {
                found: entries.len(),
                threshold: lower_threshold,
            });
        }

        let mut tally = UsageTally::new();
        for entry in &entries {
            let key = dashboard_key(entry)?;
            let username = entry.label(USERNAME_LABEL);

            if username
                .is_some_and(|username| !username.is_empty() && ignored_users.contains(username))
            {
                continue;
            }

            tally.record(key, username);
        }

        Ok(tally.into_records())
    }

    async fn read_chunked(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        chunk_size: TimeDelta,
    ) -> AppResult<Vec<LogEntry>> {
        let mut entries = Vec::new();
        let mut chunk_start = start;
        let mut chunks = 0_usize;

        while chunk_start < end {
            let chunk_end = chunk_start
                .checked_add_signed(chunk_size)
                .map_or(end, |chunk_end| chunk_end.min(end));
            let chunk = self
                .reader
                .query_range(query, chunk_start, chunk_end)
                .await
                .map_err(|error| {
                    error.context(format!(
                        "querying logs from {chunk_start} to {chunk_end}"
                    ))
                })?;

            chunks += 1;
            entries.extend(chunk);
            chunk_start = chunk_end;
        }

        debug!(
            chunks,
            entries = entries.len(),
            start = %start,
            end = %end,
            "read dashboard access logs"
        );

        Ok(entries)
    }
}

fn dashboard_key(entry: &LogEntry) -> AppResult<DashboardKey> {
    let path = entry.label(PATH_LABEL).ok_or_else(|| {
        AppError::Protocol(format!(
            "could not find {PATH_LABEL} in stream labels: {:?}",
            entry.labels()
        ))
    })?;

    DashboardKey::from_access_path(path)
        .map_err(|error| error.context(format!("extracting dashboard from path '{path}'")))
}
