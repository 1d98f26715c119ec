//! Dashboard pruning worker runtime.

#![forbid(unsafe_code)]

mod health;
mod shutdown;
mod worker_config;

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use dashprune_application::{
    DashboardArchive, DashboardPruner, DashboardPrunerConfig, LogRangeReader, UsageService,
};
use dashprune_core::{AppError, AppResult};
use dashprune_infrastructure::{GitHubDashboardArchive, GrafanaDashboardDirectory, LokiLogClient};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::health::{HealthResponse, health_router, serve_health};
use crate::shutdown::ShutdownSignals;
use crate::worker_config::WorkerConfig;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let mut signals = ShutdownSignals::install()?;
    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    let pruners = build_pruners(&config, &http_client)?;
    let namespaces: Vec<String> = pruners.keys().cloned().collect();

    let host = IpAddr::from_str(&config.health_host).map_err(|error| {
        AppError::Validation(format!("invalid HEALTH_HOST '{}': {error}", config.health_host))
    })?;
    let address = SocketAddr::from((host, config.health_port));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind health listener: {error}")))?;

    info!(
        %address,
        namespaces = %namespaces.join(", "),
        dry_run = config.prune.dry_run,
        period = %config.prune.period,
        interval_seconds = config.prune.interval.as_secs(),
        "dashprune-worker started"
    );

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    for pruner in pruners.into_values() {
        info!(
            namespace = pruner.namespace(),
            dry_run = pruner.is_dry_run(),
            "spawning dashboard pruner"
        );
        tasks.spawn(pruner.run(cancel.clone()));
    }

    let router = health_router(HealthResponse::ok(namespaces, config.prune.dry_run));
    let health_cancel = cancel.clone();
    tasks.spawn(async move {
        if let Err(error) = serve_health(listener, router, health_cancel.clone()).await {
            error!(error = %error, "health server stopped");
            health_cancel.cancel();
        }
    });

    tokio::select! {
        signal = signals.recv() => match signal {
            Ok(signal) => info!(signal, "shutdown signal received"),
            Err(error) => warn!(error = %error, "failed to listen for shutdown signal"),
        },
        () = cancel.cancelled() => {}
    }
    cancel.cancel();

    while let Some(joined) = tasks.join_next().await {
        if let Err(error) = joined {
            warn!(error = %error, "worker task ended abnormally");
        }
    }

    info!("dashprune-worker stopped");
    Ok(())
}

fn build_pruners(
    config: &WorkerConfig,
    http_client: &reqwest::Client,
) -> AppResult<BTreeMap<String, DashboardPruner>> {
    let loki = LokiLogClient::new(
        http_client.clone(),
        config.loki.endpoint.as_str(),
        config.loki.tenant_id.clone(),
    )?;
    let usage_service = UsageService::new(LogRangeReader::new(
        Arc::new(loki),
        config.loki.query_limit,
    )?);
    let archive: Arc<dyn DashboardArchive> = Arc::new(GitHubDashboardArchive::new(
        http_client.clone(),
        config.github.clone(),
    )?);

    let mut pruners = BTreeMap::new();
    for (namespace, token) in &config.grafana.tokens {
        let directory = GrafanaDashboardDirectory::new(
            http_client.clone(),
            config.grafana.endpoint.as_str(),
            token.as_str(),
        )
        .map_err(|error| error.context(format!("configuring namespace '{namespace}'")))?;

        let pruner = DashboardPruner::new(
            DashboardPrunerConfig {
                namespace: namespace.clone(),
                interval: config.prune.interval,
                period: config.prune.period,
                selector: config.prune.selector.clone(),
                ignored_users: config.prune.ignored_users.clone(),
                skip_tags: config.prune.skip_tags.clone(),
                lower_threshold: config.prune.lower_threshold,
                chunk_size: config.prune.chunk_size,
                dry_run: config.prune.dry_run,
            },
            Arc::new(directory),
            archive.clone(),
            usage_service.clone(),
        )?;
        pruners.insert(namespace.clone(), pruner);
    }

    Ok(pruners)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
