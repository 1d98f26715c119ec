use std::collections::HashMap;

use dashprune_domain::{Dashboard, DashboardKey, KeepReason, PruneDecision, UsageRecord};

/// Named predicate that can exempt a dashboard from deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrunePolicy {
    /// Keep dashboards read within the lookback window.
    KeepUsed,
    /// Keep dashboards provisioned by external tooling.
    KeepProvisioned,
    /// Keep dashboards carrying any of these tags.
    KeepTagged(Vec<String>),
}

impl PrunePolicy {
    /// Returns the policy name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::KeepUsed => "keep_used",
            Self::KeepProvisioned => "keep_provisioned",
            Self::KeepTagged(_) => "keep_tagged",
        }
    }

    /// Returns why the dashboard must be kept, if this policy applies.
    #[must_use]
    pub fn evaluate(&self, dashboard: &Dashboard, usage: &UsageIndex) -> Option<KeepReason> {
        match self {
            Self::KeepUsed => usage.get(dashboard.key()).map(|record| KeepReason::Used {
                reads: record.reads(),
                users: record.unique_users(),
            }),
            Self::KeepProvisioned => dashboard.managed_by().map(|manager| KeepReason::Provisioned {
                manager: manager.to_owned(),
            }),
            Self::KeepTagged(skip_tags) => dashboard
                .tags()
                .iter()
                .find(|tag| skip_tags.contains(*tag))
                .map(|tag| KeepReason::SkipTag { tag: tag.clone() }),
        }
    }
}

/// Usage records indexed by dashboard key.
#[derive(Debug, Default)]
pub struct UsageIndex(HashMap<DashboardKey, UsageRecord>);

impl UsageIndex {
    /// Returns the usage record of a dashboard.
    #[must_use]
    pub fn get(&self, key: &DashboardKey) -> Option<&UsageRecord> {
        self.0.get(key)
    }

    /// Returns the number of used dashboards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether no dashboard was used.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<UsageRecord> for UsageIndex {
    fn from_iter<T: IntoIterator<Item = UsageRecord>>(records: T) -> Self {
        Self(
            records
                .into_iter()
                .map(|record| (record.key().clone(), record))
                .collect(),
        )
    }
}

/// Policies evaluated in a fixed priority order; the first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunePolicies(Vec<PrunePolicy>);

impl PrunePolicies {
    /// Used, then provisioned, then skip-tag.
    #[must_use]
    pub fn standard(skip_tags: Vec<String>) -> Self {
        Self(vec![
            PrunePolicy::KeepUsed,
            PrunePolicy::KeepProvisioned,
            PrunePolicy::KeepTagged(skip_tags),
        ])
    }

    /// Returns the policies in evaluation order.
    #[must_use]
    pub fn policies(&self) -> &[PrunePolicy] {
        &self.0
    }

    /// Decides whether a dashboard is kept or becomes a deletion candidate.
    #[must_use]
    pub fn decide(&self, dashboard: &Dashboard, usage: &UsageIndex) -> PruneDecision {
        self.0
            .iter()
            .find_map(|policy| policy.evaluate(dashboard, usage))
            .map_or(PruneDecision::Delete, PruneDecision::Keep)
    }
}
