//! Application services and ports.

#![forbid(unsafe_code)]

mod log_range_reader;
mod prune_ports;
mod prune_service;
mod usage_service;

#[cfg(test)]
mod test_support;

pub use log_range_reader::{DEFAULT_LOG_PAGE_LIMIT, LogRangeReader};
pub use prune_ports::{DashboardArchive, DashboardDirectory, LogPageSource, LogRangePageRequest};
pub use prune_service::{
    DashboardPruner, DashboardPrunerConfig, PrunePolicies, PrunePolicy, PruneState, UsageIndex,
};
pub use usage_service::{
    DEFAULT_CHUNK_SIZE, DEFAULT_LOWER_THRESHOLD, PATH_LABEL, USERNAME_LABEL, UsageService,
    UsedDashboardsOptions, dashboard_access_query,
};
