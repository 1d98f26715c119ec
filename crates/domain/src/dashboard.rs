use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use dashprune_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Format of dashboard access paths emitted by the dashboard service.
pub const DASHBOARD_ACCESS_PATH_FORMAT: &str =
    "/apis/dashboard.grafana.app/v1beta1/namespaces/:namespace/dashboards/:uid";

/// Suffix appended to access paths when the UI loads a dashboard detail view.
const DETAIL_VIEW_SUFFIX: &str = "/dto";

/// Identity of a dashboard: names are unique only within a namespace.
///
/// Keys order by name first and namespace second.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DashboardKey {
    namespace: NonEmptyString,
    name: NonEmptyString,
}

impl DashboardKey {
    /// Creates a validated dashboard key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            namespace: NonEmptyString::new(namespace).map_err(|error| {
                AppError::Validation(format!("dashboard namespace is invalid: {error}"))
            })?,
            name: NonEmptyString::new(name).map_err(|error| {
                AppError::Validation(format!("dashboard name is invalid: {error}"))
            })?,
        })
    }

    /// Extracts a key from a dashboard access path.
    ///
    /// Accepts `/apis/dashboard.grafana.app/<version>/namespaces/<namespace>/dashboards/<name>`,
    /// optionally followed by the `/dto` segment the UI requests when a user opens the
    /// dashboard. The path parameter is called `:uid` by the dashboard service but it
    /// holds the dashboard's name.
    pub fn from_access_path(path: &str) -> AppResult<Self> {
        let path = path.strip_suffix(DETAIL_VIEW_SUFFIX).unwrap_or(path);
        let parts: Vec<&str> = path.split('/').collect();
        let unexpected = |detail: String| {
            AppError::Protocol(format!(
                "unexpected path format: '{path}', expected format '{DASHBOARD_ACCESS_PATH_FORMAT}': {detail}"
            ))
        };

        if parts.len() != 8 {
            return Err(unexpected(format!(
                "expected part count 8 but got {}",
                parts.len()
            )));
        }

        for (index, expected) in [(2, "dashboard.grafana.app"), (4, "namespaces"), (6, "dashboards")]
        {
            if parts[index] != expected {
                return Err(unexpected(format!(
                    "expected part {index} to be '{expected}' but got '{}'",
                    parts[index]
                )));
            }
        }

        Self::new(parts[5], parts[7]).map_err(|error| unexpected(error.to_string()))
    }

    /// Returns the dashboard namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.namespace.as_str()
    }

    /// Returns the dashboard name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

impl Ord for DashboardKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.namespace.cmp(&other.namespace))
    }
}

impl PartialOrd for DashboardKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for DashboardKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}/{}", self.namespace(), self.name())
    }
}

/// Input used to build a dashboard directory entry.
#[derive(Debug, Clone)]
pub struct DashboardInput {
    /// Namespace and name.
    pub key: DashboardKey,
    /// Stable opaque identifier assigned by the dashboard service.
    pub uid: String,
    /// Human readable title.
    pub title: String,
    /// Tags attached to the dashboard.
    pub tags: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Raw definition payload as returned by the dashboard service.
    pub definition: Vec<u8>,
    /// Tool that provisions the dashboard, if any.
    pub managed_by: Option<String>,
}

/// Dashboard directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    key: DashboardKey,
    uid: String,
    title: String,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    definition: Vec<u8>,
    managed_by: Option<String>,
}

impl Dashboard {
    /// Creates a dashboard directory entry.
    #[must_use]
    pub fn new(input: DashboardInput) -> Self {
        Self {
            key: input.key,
            uid: input.uid,
            title: input.title,
            tags: input.tags,
            created_at: input.created_at,
            definition: input.definition,
            managed_by: input.managed_by,
        }
    }

    /// Returns the dashboard key.
    #[must_use]
    pub fn key(&self) -> &DashboardKey {
        &self.key
    }

    /// Returns the dashboard uid.
    #[must_use]
    pub fn uid(&self) -> &str {
        self.uid.as_str()
    }

    /// Returns the dashboard title.
    #[must_use]
    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    /// Returns the dashboard tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the raw definition payload.
    #[must_use]
    pub fn definition(&self) -> &[u8] {
        &self.definition
    }

    /// Returns the provisioning tool marker.
    #[must_use]
    pub fn managed_by(&self) -> Option<&str> {
        self.managed_by.as_deref()
    }

    /// Provisioned dashboards are managed declaratively elsewhere and are never deleted.
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        self.managed_by.is_some()
    }
}
