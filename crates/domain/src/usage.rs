use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use dashprune_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::DashboardKey;

/// One log line read from the log store together with its stream labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    timestamp: DateTime<Utc>,
    message: String,
    labels: BTreeMap<String, String>,
}

impl LogEntry {
    /// Creates a log entry.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            timestamp,
            message: message.into(),
            labels,
        }
    }

    /// Returns the nanosecond-precision timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the raw log line.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Returns the stream labels.
    #[must_use]
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Returns a single label value.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// Non-empty set of stream labels identifying the dashboard service's logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector(BTreeMap<String, String>);

impl LabelSelector {
    /// Creates a validated label selector.
    pub fn new(labels: BTreeMap<String, String>) -> AppResult<Self> {
        if labels.is_empty() {
            return Err(AppError::Validation(
                "labels must not be empty".to_owned(),
            ));
        }

        if let Some(name) = labels.keys().find(|name| name.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "label name '{name}' must not be empty"
            )));
        }

        Ok(Self(labels))
    }

    /// Returns the selected labels.
    #[must_use]
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl Display for LabelSelector {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        let matchers: Vec<String> = self
            .0
            .iter()
            .map(|(name, value)| format!("{name}=\"{}\"", escape_label_value(value)))
            .collect();
        write!(formatter, "{{{}}}", matchers.join(", "))
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        match character {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Read statistics for one dashboard over a lookback window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    key: DashboardKey,
    reads: usize,
    unique_users: usize,
}

impl UsageRecord {
    /// Creates a usage record, rejecting more unique users than reads.
    pub fn new(key: DashboardKey, reads: usize, unique_users: usize) -> AppResult<Self> {
        if unique_users > reads {
            return Err(AppError::Validation(format!(
                "dashboard '{key}' cannot have more unique users ({unique_users}) than reads ({reads})"
            )));
        }

        Ok(Self {
            key,
            reads,
            unique_users,
        })
    }

    /// Returns the dashboard key.
    #[must_use]
    pub fn key(&self) -> &DashboardKey {
        &self.key
    }

    /// Returns the number of attributed reads, anonymous ones included.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the number of distinct named readers.
    #[must_use]
    pub fn unique_users(&self) -> usize {
        self.unique_users
    }
}

/// Accumulates dashboard reads into usage records.
#[derive(Debug, Default)]
pub struct UsageTally {
    reads: HashMap<DashboardKey, usize>,
    users: HashMap<DashboardKey, HashSet<String>>,
}

impl UsageTally {
    /// Creates an empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one read. Empty usernames count as a read but not as a user.
    pub fn record(&mut self, key: DashboardKey, username: Option<&str>) {
        let username = username.filter(|username| !username.is_empty());
        if let Some(username) = username {
            self.users
                .entry(key.clone())
                .or_default()
                .insert(username.to_owned());
        }
        *self.reads.entry(key).or_insert(0) += 1;
    }

    /// Returns one record per dashboard sorted by name, then namespace.
    #[must_use]
    pub fn into_records(self) -> Vec<UsageRecord> {
        let Self { reads, mut users } = self;
        let mut records: Vec<UsageRecord> = reads
            .into_iter()
            .map(|(key, reads)| {
                let unique_users = users.remove(&key).map_or(0, |readers| readers.len());
                UsageRecord {
                    key,
                    reads,
                    unique_users,
                }
            })
            .collect();
        records.sort_by(|left, right| left.key.cmp(&right.key));
        records
    }
}
