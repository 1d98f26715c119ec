use std::fmt::{Display, Formatter};

use crate::DashboardKey;

/// Why a dashboard is kept instead of deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepReason {
    /// Dashboard was read within the lookback window.
    Used {
        /// Number of reads.
        reads: usize,
        /// Number of distinct named readers.
        users: usize,
    },
    /// Dashboard is provisioned by an external tool.
    Provisioned {
        /// Provisioning tool recorded on the dashboard.
        manager: String,
    },
    /// Dashboard carries a tag exempting it from deletion.
    SkipTag {
        /// Tag that matched the skip list.
        tag: String,
    },
}

impl KeepReason {
    /// Returns a stable label for log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Used { .. } => "used",
            Self::Provisioned { .. } => "provisioned",
            Self::SkipTag { .. } => "skip_tag",
        }
    }
}

/// Outcome of evaluating prune policies for one dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneDecision {
    /// Dashboard stays.
    Keep(KeepReason),
    /// Dashboard is a deletion candidate.
    Delete,
}

/// Summary of one prune run. Logged, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    /// Dashboards listed in the namespace.
    pub inspected: usize,
    /// Dashboards kept because they were read.
    pub used: usize,
    /// Dashboards kept by provisioning or skip-tag policy.
    pub skipped: usize,
    /// Dashboards that qualified for deletion.
    pub candidates: usize,
    /// Dashboards backed up and deleted, in deletion order.
    pub deleted: Vec<DashboardKey>,
    /// Error that aborted the run, if any.
    pub error: Option<String>,
}

impl PruneOutcome {
    /// Returns whether the run finished without aborting.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Tallies one kept dashboard.
    pub fn record_keep(&mut self, reason: &KeepReason) {
        match reason {
            KeepReason::Used { .. } => self.used += 1,
            KeepReason::Provisioned { .. } | KeepReason::SkipTag { .. } => self.skipped += 1,
        }
    }
}

impl Display for PruneOutcome {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        let deleted: Vec<String> = self.deleted.iter().map(ToString::to_string).collect();
        write!(
            formatter,
            "inspected={} used={} skipped={} candidates={} deleted=[{}]",
            self.inspected,
            self.used,
            self.skipped,
            self.candidates,
            deleted.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{KeepReason, PruneOutcome};
    use crate::DashboardKey;

    #[test]
    fn keep_reasons_split_used_from_skipped() {
        let mut outcome = PruneOutcome::default();
        outcome.record_keep(&KeepReason::Used { reads: 3, users: 1 });
        outcome.record_keep(&KeepReason::SkipTag {
            tag: "keep".to_owned(),
        });
        outcome.record_keep(&KeepReason::Provisioned {
            manager: "terraform".to_owned(),
        });

        assert_eq!(outcome.used, 1);
        assert_eq!(outcome.skipped, 2);
    }

    #[test]
    fn outcome_renders_deleted_keys() {
        let outcome = PruneOutcome {
            inspected: 2,
            candidates: 1,
            deleted: vec![DashboardKey::new("default", "stale").unwrap_or_else(|_| unreachable!())],
            ..PruneOutcome::default()
        };

        assert_eq!(
            outcome.to_string(),
            "inspected=2 used=0 skipped=0 candidates=1 deleted=[default/stale]"
        );
    }
}
