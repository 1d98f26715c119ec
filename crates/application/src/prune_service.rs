use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use dashprune_core::{AppError, AppResult};
use dashprune_domain::{Dashboard, KeepReason, LabelSelector, PruneDecision, PruneOutcome};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::prune_ports::{DashboardArchive, DashboardDirectory};
use crate::usage_service::{UsageService, UsedDashboardsOptions};

mod policies;
mod schedule;

pub use policies::{PrunePolicies, PrunePolicy, UsageIndex};
pub use schedule::PruneState;

/// Settings for one namespace pruner.
#[derive(Debug, Clone)]
pub struct DashboardPrunerConfig {
    /// Namespace whose dashboards are pruned.
    pub namespace: String,
    /// Time between prune runs.
    pub interval: Duration,
    /// Lookback period used when analysing usage.
    pub period: TimeDelta,
    /// Labels identifying the dashboard service's log streams.
    pub selector: LabelSelector,
    /// Users whose reads do not count toward usage.
    pub ignored_users: Vec<String>,
    /// Tags exempting dashboards from deletion.
    pub skip_tags: Vec<String>,
    /// See [`UsedDashboardsOptions::lower_threshold`].
    pub lower_threshold: Option<i64>,
    /// See [`UsedDashboardsOptions::chunk_size`].
    pub chunk_size: Option<TimeDelta>,
    /// Log deletion candidates without archiving or deleting them.
    pub dry_run: bool,
}

/// Decision engine deleting unused dashboards of one namespace.
pub struct DashboardPruner {
    config: DashboardPrunerConfig,
    directory: Arc<dyn DashboardDirectory>,
    archive: Arc<dyn DashboardArchive>,
    usage_service: UsageService,
    policies: PrunePolicies,
}

impl DashboardPruner {
    /// Creates a pruner for one namespace.
    pub fn new(
        config: DashboardPrunerConfig,
        directory: Arc<dyn DashboardDirectory>,
        archive: Arc<dyn DashboardArchive>,
        usage_service: UsageService,
    ) -> AppResult<Self> {
        if config.namespace.trim().is_empty() {
            return Err(AppError::Validation(
                "pruner namespace must not be empty".to_owned(),
            ));
        }

        if config.interval.is_zero() {
            return Err(AppError::Validation(format!(
                "prune interval for namespace '{}' must be greater than zero",
                config.namespace
            )));
        }

        if config.period <= TimeDelta::zero() {
            return Err(AppError::Validation(format!(
                "prune period for namespace '{}' must be greater than zero",
                config.namespace
            )));
        }

        let policies = PrunePolicies::standard(config.skip_tags.clone());

        Ok(Self {
            config,
            directory,
            archive,
            usage_service,
            policies,
        })
    }

    /// Returns the pruned namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.config.namespace.as_str()
    }

    /// Returns whether the pruner only logs candidates.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Runs prune passes until `cancel` fires.
    ///
    /// The first pass starts immediately. Later passes start on every
    /// interval tick; a pass in flight is abandoned on cancellation.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            namespace = %self.config.namespace,
            dry_run = self.config.dry_run,
            interval_seconds = self.config.interval.as_secs(),
            "starting dashboard pruner"
        );

        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.config.interval,
            self.config.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut state = PruneState::initial();

        loop {
            match state {
                PruneState::Pruning => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = self.prune_once() => state = state.on_run_finished(),
                    }
                }
                PruneState::Idle => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => state = state.on_tick(),
                    }
                }
            }
        }

        info!(
            namespace = %self.config.namespace,
            dry_run = self.config.dry_run,
            state = state.as_str(),
            "stopping dashboard pruner"
        );
    }

    /// Executes one prune pass and returns its outcome.
    ///
    /// Errors never escape: they abort the pass, are logged, and are recorded
    /// on the outcome. Final counts are logged on every path.
    pub async fn prune_once(&self) -> PruneOutcome {
        info!(
            namespace = %self.config.namespace,
            dry_run = self.config.dry_run,
            "pruning dashboards"
        );

        let mut outcome = PruneOutcome::default();
        if let Err(prune_error) = self.prune(&mut outcome).await {
            error!(
                namespace = %self.config.namespace,
                dry_run = self.config.dry_run,
                error = %prune_error,
                "failed to prune dashboards"
            );
            outcome.error = Some(prune_error.to_string());
        }

        let deleted: Vec<String> = outcome.deleted.iter().map(ToString::to_string).collect();
        info!(
            namespace = %self.config.namespace,
            dry_run = self.config.dry_run,
            total = outcome.inspected,
            used = outcome.used,
            skipped = outcome.skipped,
            candidates = outcome.candidates,
            deleted_count = outcome.deleted.len(),
            deleted_dashboards = %deleted.join(", "),
            complete = outcome.is_complete(),
            "finished pruning dashboards"
        );

        outcome
    }

    async fn prune(&self, outcome: &mut PruneOutcome) -> AppResult<()> {
        let dashboards = self
            .directory
            .list_dashboards(&self.config.namespace)
            .await
            .map_err(|error| error.context("fetching all dashboards"))?;
        outcome.inspected = dashboards.len();
        info!(
            namespace = %self.config.namespace,
            dry_run = self.config.dry_run,
            count = dashboards.len(),
            "found all dashboards"
        );

        let options = UsedDashboardsOptions {
            ignored_users: self.config.ignored_users.clone(),
            chunk_size: self.config.chunk_size,
            lower_threshold: self.config.lower_threshold,
        };
        let usage: UsageIndex = self
            .usage_service
            .used_dashboards(&self.config.selector, self.config.period, &options)
            .await
            .map_err(|error| error.context("fetching used dashboards"))?
            .into_iter()
            .collect();
        info!(
            namespace = %self.config.namespace,
            dry_run = self.config.dry_run,
            count = usage.len(),
            "found used dashboards"
        );

        let mut candidates = Vec::new();
        for dashboard in &dashboards {
            match self.policies.decide(dashboard, &usage) {
                PruneDecision::Keep(reason) => {
                    self.log_kept(dashboard, &reason);
                    outcome.record_keep(&reason);
                }
                PruneDecision::Delete => candidates.push(dashboard),
            }
        }
        outcome.candidates = candidates.len();

        for dashboard in candidates {
            if self.config.dry_run {
                info!(
                    namespace = %self.config.namespace,
                    dry_run = true,
                    uid = %dashboard.uid(),
                    name = %dashboard.key().name(),
                    title = %dashboard.title(),
                    "found unused dashboard, skipping deletion due to dry run"
                );
                continue;
            }

            self.backup_and_delete(dashboard).await?;
            outcome.deleted.push(dashboard.key().clone());
        }

        Ok(())
    }

    async fn backup_and_delete(&self, dashboard: &Dashboard) -> AppResult<()> {
        let key = dashboard.key();
        info!(
            namespace = %self.config.namespace,
            dry_run = false,
            uid = %dashboard.uid(),
            name = %key.name(),
            title = %dashboard.title(),
            raw_json = %String::from_utf8_lossy(dashboard.definition()),
            "deleting unused dashboard"
        );

        self.archive
            .backup_dashboard(key.namespace(), key.name(), dashboard.definition())
            .await
            .map_err(|error| {
                error.context(format!(
                    "backing up dashboard '{key}' (uid {})",
                    dashboard.uid()
                ))
            })?;

        self.directory
            .delete_dashboard(key.namespace(), key.name())
            .await
            .map_err(|error| {
                error.context(format!(
                    "deleting unused dashboard '{key}' (uid {})",
                    dashboard.uid()
                ))
            })?;

        info!(
            namespace = %self.config.namespace,
            dry_run = false,
            uid = %dashboard.uid(),
            name = %key.name(),
            "deleted unused dashboard"
        );

        Ok(())
    }

    fn log_kept(&self, dashboard: &Dashboard, reason: &KeepReason) {
        match reason {
            KeepReason::Used { reads, users } => debug!(
                namespace = %self.config.namespace,
                dry_run = self.config.dry_run,
                uid = %dashboard.uid(),
                name = %dashboard.key().name(),
                reads,
                users,
                period = %self.config.period,
                "skipping used dashboard"
            ),
            KeepReason::Provisioned { manager } => info!(
                namespace = %self.config.namespace,
                dry_run = self.config.dry_run,
                uid = %dashboard.uid(),
                name = %dashboard.key().name(),
                managed_by = %manager,
                reason = reason.as_str(),
                "skipping provisioned dashboard"
            ),
            KeepReason::SkipTag { tag } => info!(
                namespace = %self.config.namespace,
                dry_run = self.config.dry_run,
                uid = %dashboard.uid(),
                name = %dashboard.key().name(),
                tag = %tag,
                reason = reason.as_str(),
                "skipping dashboard with skip tag"
            ),
        }
    }
}
