//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod github_dashboard_archive;
mod grafana_dashboard_directory;
mod http_support;
mod loki_log_client;

#[cfg(test)]
mod test_server;

pub use github_dashboard_archive::{
    DEFAULT_GITHUB_API_URL, GitHubArchiveConfig, GitHubDashboardArchive, GitHubRepository,
};
pub use grafana_dashboard_directory::{DASHBOARD_PAGE_SIZE, GrafanaDashboardDirectory};
pub use loki_log_client::{LogStream, LokiLogClient};
