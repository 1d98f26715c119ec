//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod dashboard;
mod prune;
mod usage;

pub use dashboard::{DASHBOARD_ACCESS_PATH_FORMAT, Dashboard, DashboardInput, DashboardKey};
pub use prune::{KeepReason, PruneDecision, PruneOutcome};
pub use usage::{LabelSelector, LogEntry, UsageRecord, UsageTally};
