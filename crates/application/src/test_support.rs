use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use dashprune_core::{AppError, AppResult};
use dashprune_domain::{Dashboard, DashboardInput, DashboardKey, LogEntry};

use crate::prune_ports::{
    DashboardArchive, DashboardDirectory, LogPageSource, LogRangePageRequest,
};

pub(crate) fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_760_000_000, 0).unwrap_or_else(|| unreachable!())
}

pub(crate) fn at_nanos(offset: i64) -> DateTime<Utc> {
    base_time() + TimeDelta::nanoseconds(offset)
}

pub(crate) fn access_path(namespace: &str, name: &str) -> String {
    format!("/apis/dashboard.grafana.app/v1beta1/namespaces/{namespace}/dashboards/{name}")
}

pub(crate) fn access_entry(
    timestamp: DateTime<Utc>,
    namespace: &str,
    name: &str,
    username: Option<&str>,
) -> LogEntry {
    let mut labels = BTreeMap::from([
        ("path".to_owned(), access_path(namespace, name)),
        ("method".to_owned(), "GET".to_owned()),
    ]);
    if let Some(username) = username {
        labels.insert("uname".to_owned(), username.to_owned());
    }

    LogEntry::new(timestamp, "Request Completed", labels)
}

pub(crate) fn dashboard(namespace: &str, name: &str) -> Dashboard {
    dashboard_with(namespace, name, Vec::new(), None)
}

pub(crate) fn dashboard_with(
    namespace: &str,
    name: &str,
    tags: Vec<&str>,
    managed_by: Option<&str>,
) -> Dashboard {
    Dashboard::new(DashboardInput {
        key: DashboardKey::new(namespace, name).unwrap_or_else(|_| unreachable!()),
        uid: format!("uid-{name}"),
        title: format!("Dashboard {name}"),
        tags: tags.into_iter().map(str::to_owned).collect(),
        created_at: base_time(),
        definition: format!(r#"{{"title":"Dashboard {name}"}}"#).into_bytes(),
        managed_by: managed_by.map(str::to_owned),
    })
}

/// Serves stored entries in `[start, end)` pages, like the log store does.
#[derive(Default)]
pub(crate) struct FakeLogPageSource {
    entries: Vec<LogEntry>,
    fail_on_request: Option<usize>,
    pub(crate) requests: Mutex<Vec<LogRangePageRequest>>,
}

impl FakeLogPageSource {
    pub(crate) fn new(mut entries: Vec<LogEntry>) -> Self {
        entries.sort_by_key(LogEntry::timestamp);
        Self {
            entries,
            ..Self::default()
        }
    }

    pub(crate) fn failing_on(mut self, request_index: usize) -> Self {
        self.fail_on_request = Some(request_index);
        self
    }

    pub(crate) async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl LogPageSource for FakeLogPageSource {
    async fn query_range_page(&self, request: &LogRangePageRequest) -> AppResult<Vec<LogEntry>> {
        let mut requests = self.requests.lock().await;
        let index = requests.len();
        requests.push(request.clone());

        if self.fail_on_request == Some(index) {
            return Err(AppError::Transport(
                "executing request: connection refused".to_owned(),
            ));
        }

        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.timestamp() >= request.start && entry.timestamp() < request.end)
            .take(request.limit)
            .cloned()
            .collect())
    }
}

/// Shared journal of side effects, used to assert backup-before-delete ordering.
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

pub(crate) struct FakeDashboardDirectory {
    dashboards: Vec<Dashboard>,
    list_error: bool,
    fail_delete_of: Option<String>,
    journal: Journal,
    pub(crate) list_calls: Mutex<usize>,
}

impl FakeDashboardDirectory {
    pub(crate) fn new(dashboards: Vec<Dashboard>, journal: Journal) -> Self {
        Self {
            dashboards,
            list_error: false,
            fail_delete_of: None,
            journal,
            list_calls: Mutex::new(0),
        }
    }

    pub(crate) fn failing_list(mut self) -> Self {
        self.list_error = true;
        self
    }

    pub(crate) fn failing_delete_of(mut self, name: &str) -> Self {
        self.fail_delete_of = Some(name.to_owned());
        self
    }
}

#[async_trait]
impl DashboardDirectory for FakeDashboardDirectory {
    async fn list_dashboards(&self, namespace: &str) -> AppResult<Vec<Dashboard>> {
        *self.list_calls.lock().await += 1;
        if self.list_error {
            return Err(AppError::Protocol(
                "unexpected status code: 503, body: unavailable".to_owned(),
            ));
        }

        Ok(self
            .dashboards
            .iter()
            .filter(|dashboard| dashboard.key().namespace() == namespace)
            .cloned()
            .collect())
    }

    async fn delete_dashboard(&self, namespace: &str, name: &str) -> AppResult<()> {
        if self.fail_delete_of.as_deref() == Some(name) {
            return Err(AppError::Protocol(
                "response body claims failure, dashboard may have been deleted".to_owned(),
            ));
        }

        self.journal
            .lock()
            .await
            .push(format!("delete {namespace}/{name}"));
        Ok(())
    }
}

pub(crate) struct FakeDashboardArchive {
    fail: bool,
    journal: Journal,
}

impl FakeDashboardArchive {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            fail: false,
            journal,
        }
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl DashboardArchive for FakeDashboardArchive {
    async fn backup_dashboard(
        &self,
        namespace: &str,
        name: &str,
        _definition: &[u8],
    ) -> AppResult<()> {
        if self.fail {
            return Err(AppError::Protocol(
                "checking if file exists: unexpected status code: 500".to_owned(),
            ));
        }

        self.journal
            .lock()
            .await
            .push(format!("backup {namespace}/{name}"));
        Ok(())
    }
}
