use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use chrono::TimeDelta;
use dashprune_application::DEFAULT_LOG_PAGE_LIMIT;
use dashprune_core::{AppError, AppResult};
use dashprune_domain::LabelSelector;
use dashprune_infrastructure::{DEFAULT_GITHUB_API_URL, GitHubArchiveConfig, GitHubRepository};

const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone)]
pub(crate) struct WorkerConfig {
    pub(crate) loki: LokiSettings,
    pub(crate) grafana: GrafanaSettings,
    pub(crate) prune: PruneSettings,
    pub(crate) github: GitHubArchiveConfig,
    pub(crate) health_host: String,
    pub(crate) health_port: u16,
    pub(crate) http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub(crate) struct LokiSettings {
    pub(crate) endpoint: String,
    pub(crate) tenant_id: Option<String>,
    pub(crate) query_limit: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct GrafanaSettings {
    pub(crate) endpoint: String,
    /// Service account token per namespace.
    pub(crate) tokens: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub(crate) struct PruneSettings {
    pub(crate) dry_run: bool,
    pub(crate) interval: Duration,
    pub(crate) period: TimeDelta,
    pub(crate) selector: LabelSelector,
    pub(crate) ignored_users: Vec<String>,
    pub(crate) skip_tags: Vec<String>,
    /// Unset falls back to the usage service default.
    pub(crate) lower_threshold: Option<i64>,
    pub(crate) chunk_size: Option<TimeDelta>,
}

impl WorkerConfig {
    pub(crate) fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let required = |name: &str| {
            optional(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
        };

        let loki = LokiSettings {
            endpoint: required("LOKI_ENDPOINT")?,
            tenant_id: optional("LOKI_TENANT_ID"),
            query_limit: parse_or(
                "LOKI_QUERY_LIMIT",
                optional("LOKI_QUERY_LIMIT"),
                DEFAULT_LOG_PAGE_LIMIT,
            )?,
        };
        if loki.query_limit == 0 {
            return Err(AppError::Validation(
                "LOKI_QUERY_LIMIT must be greater than zero".to_owned(),
            ));
        }

        let grafana = GrafanaSettings {
            endpoint: required("GRAFANA_ENDPOINT")?,
            tokens: parse_key_value_list("GRAFANA_TOKENS", required("GRAFANA_TOKENS")?.as_str())?,
        };

        let prune = PruneSettings {
            dry_run: optional("PRUNE_DRY_RUN")
                .map(|value| parse_bool("PRUNE_DRY_RUN", value.as_str()))
                .transpose()?
                .unwrap_or(true),
            interval: optional("PRUNE_INTERVAL")
                .map(|value| parse_duration("PRUNE_INTERVAL", value.as_str()))
                .transpose()?
                .unwrap_or(DEFAULT_PRUNE_INTERVAL),
            period: to_time_delta(
                "PRUNE_PERIOD",
                parse_duration("PRUNE_PERIOD", required("PRUNE_PERIOD")?.as_str())?,
            )?,
            selector: LabelSelector::new(parse_key_value_list(
                "PRUNE_LABELS",
                required("PRUNE_LABELS")?.as_str(),
            )?)?,
            ignored_users: optional("PRUNE_IGNORED_USERS")
                .map(|value| parse_list(value.as_str()))
                .unwrap_or_default(),
            skip_tags: optional("PRUNE_SKIP_TAGS")
                .map(|value| parse_list(value.as_str()))
                .unwrap_or_default(),
            lower_threshold: optional("PRUNE_LOWER_THRESHOLD")
                .map(|value| parse_value::<i64>("PRUNE_LOWER_THRESHOLD", value.as_str()))
                .transpose()?,
            chunk_size: optional("PRUNE_CHUNK_SIZE")
                .map(|value| {
                    to_time_delta(
                        "PRUNE_CHUNK_SIZE",
                        parse_duration("PRUNE_CHUNK_SIZE", value.as_str())?,
                    )
                })
                .transpose()?,
        };
        if let Some(lower_threshold) = prune.lower_threshold.filter(|threshold| *threshold < 0) {
            return Err(AppError::Validation(format!(
                "PRUNE_LOWER_THRESHOLD must be zero or greater, got {lower_threshold}"
            )));
        }

        let github = GitHubArchiveConfig {
            api_url: optional("GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_owned()),
            repository: required("GITHUB_REPOSITORY")?
                .parse::<GitHubRepository>()
                .map_err(|error| error.context("invalid GITHUB_REPOSITORY"))?,
            branch: optional("GITHUB_BRANCH").unwrap_or_else(|| "main".to_owned()),
            directory: optional("GITHUB_DIRECTORY")
                .unwrap_or_else(|| "deleted-dashboards".to_owned()),
            token: required("GITHUB_TOKEN")?,
        };

        let http_timeout_seconds = parse_or(
            "HTTP_TIMEOUT_SECONDS",
            optional("HTTP_TIMEOUT_SECONDS"),
            DEFAULT_HTTP_TIMEOUT_SECONDS,
        )?;
        if http_timeout_seconds == 0 {
            return Err(AppError::Validation(
                "HTTP_TIMEOUT_SECONDS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            loki,
            grafana,
            prune,
            github,
            health_host: optional("HEALTH_HOST").unwrap_or_else(|| "127.0.0.1".to_owned()),
            health_port: parse_or("HEALTH_PORT", optional("HEALTH_PORT"), 8080)?,
            http_timeout: Duration::from_secs(http_timeout_seconds),
        })
    }
}

/// Parses `key=value,key=value` into a map. Later duplicates win.
pub(crate) fn parse_key_value_list(
    name: &str,
    value: &str,
) -> AppResult<BTreeMap<String, String>> {
    let mut pairs = BTreeMap::new();
    for entry in parse_list(value) {
        let Some((key, pair_value)) = entry.split_once('=') else {
            return Err(AppError::Validation(format!(
                "invalid {name} entry '{entry}': expected key=value"
            )));
        };

        let (key, pair_value) = (key.trim(), pair_value.trim());
        if key.is_empty() || pair_value.is_empty() {
            return Err(AppError::Validation(format!(
                "invalid {name} entry '{entry}': key and value must not be empty"
            )));
        }

        pairs.insert(key.to_owned(), pair_value.to_owned());
    }

    if pairs.is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(pairs)
}

/// Splits a comma separated list, dropping blank entries.
pub(crate) fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Parses durations such as `45s`, `10m`, `1h30m` or `30d`.
pub(crate) fn parse_duration(name: &str, value: &str) -> AppResult<Duration> {
    let invalid = |reason: &str| {
        AppError::Validation(format!("invalid {name} duration '{value}': {reason}"))
    };

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    for character in value.trim().chars() {
        if character.is_ascii_digit() {
            digits.push(character);
            continue;
        }

        let unit_seconds: u64 = match character {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => return Err(invalid("expected units s, m, h or d")),
        };
        let amount = digits
            .parse::<u64>()
            .map_err(|_| invalid("expected a number before each unit"))?;
        digits.clear();

        let seconds = amount
            .checked_mul(unit_seconds)
            .ok_or_else(|| invalid("value is too large"))?;
        total = total
            .checked_add(Duration::from_secs(seconds))
            .ok_or_else(|| invalid("value is too large"))?;
    }

    if !digits.is_empty() {
        return Err(invalid("missing unit"));
    }
    if total.is_zero() {
        return Err(invalid("must be greater than zero"));
    }

    Ok(total)
}

fn parse_bool(name: &str, value: &str) -> AppResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "invalid {name} value '{value}': expected true or false"
        ))),
    }
}

fn parse_value<T>(name: &str, value: &str) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}")))
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) => parse_value(name, value.as_str()),
        None => Ok(default),
    }
}

fn to_time_delta(name: &str, duration: Duration) -> AppResult<TimeDelta> {
    TimeDelta::from_std(duration)
        .map_err(|error| AppError::Validation(format!("invalid {name} duration: {error}")))
}
