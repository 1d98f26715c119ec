//! Grafana dashboard API adapter (`dashboard.grafana.app/v1beta1`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashprune_application::DashboardDirectory;
use dashprune_core::{AppError, AppResult};
use dashprune_domain::{Dashboard, DashboardInput, DashboardKey};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::debug;
use url::Url;

use crate::http_support::{body_for_error, join_segments, parse_base_url};

/// Maximum number of dashboards requested per list page.
pub const DASHBOARD_PAGE_SIZE: usize = 500;

const MANAGED_BY_ANNOTATION: &str = "grafana.app/managedBy";
const API_GROUP: &str = "dashboard.grafana.app";
const API_VERSION: &str = "v1beta1";

/// Dashboard directory backed by Grafana's HTTP API.
#[derive(Clone)]
pub struct GrafanaDashboardDirectory {
    http_client: reqwest::Client,
    endpoint: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct DashboardListResponse {
    #[serde(default)]
    metadata: ListMetadata,
    #[serde(default)]
    items: Vec<DashboardItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ListMetadata {
    #[serde(default, rename = "continue")]
    continue_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DashboardItem {
    metadata: ItemMetadata,
    #[serde(default)]
    spec: Option<Box<RawValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemMetadata {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    uid: String,
    #[serde(default)]
    creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct DashboardSpecSummary {
    #[serde(default)]
    title: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteDashboardResponse {
    #[serde(default)]
    status: String,
}

impl GrafanaDashboardDirectory {
    /// Creates a directory client authenticating with a bearer token.
    pub fn new(
        http_client: reqwest::Client,
        endpoint: &str,
        token: impl Into<String>,
    ) -> AppResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AppError::Validation(
                "grafana token must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            http_client,
            endpoint: parse_base_url("grafana", endpoint)?,
            token,
        })
    }

    fn dashboards_url(&self, namespace: &str) -> AppResult<Url> {
        join_segments(
            &self.endpoint,
            ["apis", API_GROUP, API_VERSION, "namespaces", namespace, "dashboards"],
        )
    }

    async fn dashboards_page(
        &self,
        namespace: &str,
        continue_token: Option<&str>,
    ) -> AppResult<(Vec<Dashboard>, Option<String>)> {
        let mut url = self.dashboards_url(namespace)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", DASHBOARD_PAGE_SIZE.to_string().as_str());
            if let Some(continue_token) = continue_token {
                query.append_pair("continue", continue_token);
            }
        }

        let response = self
            .http_client
            .get(url)
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|error| AppError::Transport(format!("making request to grafana: {error}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = body_for_error(response).await;
            return Err(AppError::Protocol(format!(
                "unexpected status code: {}, body: {body}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|error| AppError::Transport(format!("reading response body: {error}")))?;
        let page = serde_json::from_str::<DashboardListResponse>(&body)
            .map_err(|error| AppError::Protocol(format!("decoding response: {error}")))?;

        let dashboards = page
            .items
            .into_iter()
            .map(|item| dashboard_from_item(namespace, item))
            .collect::<AppResult<Vec<_>>>()?;

        let next = page
            .metadata
            .continue_token
            .filter(|continue_token| !continue_token.is_empty());

        Ok((dashboards, next))
    }
}

#[async_trait]
impl DashboardDirectory for GrafanaDashboardDirectory {
    async fn list_dashboards(&self, namespace: &str) -> AppResult<Vec<Dashboard>> {
        let mut dashboards = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let (page, next) = self
                .dashboards_page(namespace, continue_token.as_deref())
                .await
                .map_err(|error| error.context("getting dashboards page"))?;
            debug!(namespace, count = page.len(), "fetched dashboards page");
            dashboards.extend(page);

            match next {
                Some(next) => continue_token = Some(next),
                None => break,
            }
        }

        Ok(dashboards)
    }

    async fn delete_dashboard(&self, namespace: &str, name: &str) -> AppResult<()> {
        if name.is_empty() {
            return Err(AppError::Validation(
                "dashboard name must not be empty".to_owned(),
            ));
        }

        let url = join_segments(
            &self.endpoint,
            ["apis", API_GROUP, API_VERSION, "namespaces", namespace, "dashboards", name],
        )?;

        let response = self
            .http_client
            .delete(url)
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|error| AppError::Transport(format!("making request to grafana: {error}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = body_for_error(response).await;
            return Err(AppError::Protocol(format!(
                "unexpected status code: {}, body: {body}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|error| AppError::Transport(format!("reading response body: {error}")))?;
        let deleted = serde_json::from_str::<DeleteDashboardResponse>(&body)
            .map_err(|error| AppError::Protocol(format!("decoding response: {error}")))?;

        if deleted.status != "Success" {
            return Err(AppError::Protocol(format!(
                "got response code {} from dashboard delete request but response body claims \
                 failure, dashboard may have been deleted",
                status.as_u16()
            )));
        }

        Ok(())
    }
}

fn dashboard_from_item(namespace: &str, item: DashboardItem) -> AppResult<Dashboard> {
    let DashboardItem { metadata, spec } = item;
    let spec = spec.as_deref().map_or("null", RawValue::get);

    // Title and tags are best effort; the raw spec is what gets archived.
    let summary = serde_json::from_str::<DashboardSpecSummary>(spec).unwrap_or_default();
    let item_namespace = metadata
        .namespace
        .filter(|item_namespace| !item_namespace.is_empty())
        .unwrap_or_else(|| namespace.to_owned());

    let key = DashboardKey::new(item_namespace, metadata.name)
        .map_err(|error| AppError::Protocol(format!("invalid dashboard in list response: {error}")))?;

    Ok(Dashboard::new(DashboardInput {
        key,
        uid: metadata.uid,
        title: summary.title,
        tags: summary.tags,
        created_at: metadata.creation_timestamp.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        definition: spec.as_bytes().to_vec(),
        managed_by: metadata.annotations.get(MANAGED_BY_ANNOTATION).cloned(),
    }))
}
