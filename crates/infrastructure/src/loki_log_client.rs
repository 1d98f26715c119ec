//! Loki HTTP adapter for range queries and pushes.
//!
//! See <https://grafana.com/docs/loki/v2.9.x/reference/api/#query-loki-over-a-range-of-time>.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashprune_application::{LogPageSource, LogRangePageRequest};
use dashprune_core::{AppError, AppResult};
use dashprune_domain::LogEntry;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::http_support::{body_for_error, join_segments, parse_base_url};

const TENANT_HEADER: &str = "X-Scope-OrgID";

/// Log store client reading pages through Loki's `query_range` endpoint.
#[derive(Clone)]
pub struct LokiLogClient {
    http_client: reqwest::Client,
    endpoint: Url,
    tenant_id: Option<String>,
}

/// One labelled stream of log lines to push.
#[derive(Debug, Clone)]
pub struct LogStream {
    /// Stream labels.
    pub labels: BTreeMap<String, String>,
    /// Timestamped log lines.
    pub lines: Vec<(DateTime<Utc>, String)>,
}

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    status: String,
    #[serde(default)]
    data: QueryRangeData,
}

#[derive(Debug, Default, Deserialize)]
struct QueryRangeData {
    #[serde(default)]
    result: Vec<QueryRangeStream>,
}

#[derive(Debug, Deserialize)]
struct QueryRangeStream {
    #[serde(default)]
    stream: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    streams: Vec<PushStream<'a>>,
}

#[derive(Debug, Serialize)]
struct PushStream<'a> {
    stream: &'a BTreeMap<String, String>,
    values: Vec<[String; 2]>,
}

impl LokiLogClient {
    /// Creates a Loki client. An empty tenant id sends no tenant header.
    pub fn new(
        http_client: reqwest::Client,
        endpoint: &str,
        tenant_id: Option<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            http_client,
            endpoint: parse_base_url("loki", endpoint)?,
            tenant_id: tenant_id.filter(|tenant_id| !tenant_id.trim().is_empty()),
        })
    }

    /// Pushes log lines through `/loki/api/v1/push`.
    pub async fn push(&self, streams: &[LogStream]) -> AppResult<()> {
        let url = join_segments(&self.endpoint, ["loki", "api", "v1", "push"])?;
        let mut push_streams = Vec::with_capacity(streams.len());
        for stream in streams {
            let values = stream
                .lines
                .iter()
                .map(|(timestamp, line)| -> AppResult<[String; 2]> {
                    Ok([unix_nanos(*timestamp)?.to_string(), line.clone()])
                })
                .collect::<AppResult<Vec<_>>>()?;
            push_streams.push(PushStream {
                stream: &stream.labels,
                values,
            });
        }

        let response = self
            .with_tenant(self.http_client.post(url))
            .json(&PushRequest {
                streams: push_streams,
            })
            .send()
            .await
            .map_err(|error| AppError::Transport(format!("pushing logs to loki: {error}")))?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let body = body_for_error(response).await;
            return Err(AppError::Protocol(format!(
                "pushing logs to loki: unexpected status code: {}, body: {body}",
                status.as_u16()
            )));
        }

        Ok(())
    }

    fn with_tenant(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.tenant_id {
            Some(tenant_id) => builder.header(TENANT_HEADER, tenant_id.as_str()),
            None => builder,
        }
    }
}

#[async_trait]
impl LogPageSource for LokiLogClient {
    async fn query_range_page(&self, request: &LogRangePageRequest) -> AppResult<Vec<LogEntry>> {
        let mut url = join_segments(&self.endpoint, ["loki", "api", "v1", "query_range"])?;
        url.query_pairs_mut()
            .append_pair("query", request.query.as_str())
            .append_pair("start", unix_nanos(request.start)?.to_string().as_str())
            .append_pair("end", unix_nanos(request.end)?.to_string().as_str())
            .append_pair("limit", request.limit.to_string().as_str())
            .append_pair("direction", "forward");

        let response = self
            .with_tenant(self.http_client.get(url))
            .send()
            .await
            .map_err(|error| AppError::Transport(format!("executing request: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| AppError::Transport(format!("reading response body: {error}")))?;

        if status != StatusCode::OK {
            return Err(AppError::Protocol(format!(
                "unexpected status code: {}, body: {body}",
                status.as_u16()
            )));
        }

        let response = serde_json::from_str::<QueryRangeResponse>(&body)
            .map_err(|error| AppError::Protocol(format!("unmarshalling response: {error}")))?;

        if response.status != "success" {
            return Err(AppError::Protocol(format!(
                "query failed with status: {}",
                response.status
            )));
        }

        let mut entries = Vec::new();
        for stream in response.data.result {
            for value in &stream.values {
                entries.push(parse_entry(value, &stream.stream)?);
            }
        }

        // Lines arrive grouped per stream; the reader's cursor needs one ascending sequence.
        entries.sort_by_key(LogEntry::timestamp);

        Ok(entries)
    }
}

fn parse_entry(value: &[Value], labels: &BTreeMap<String, String>) -> AppResult<LogEntry> {
    let [Value::String(timestamp), Value::String(line)] = value else {
        return Err(AppError::Protocol(format!(
            "invalid value format in Loki response: {value:?}"
        )));
    };

    let nanoseconds = timestamp.parse::<i64>().map_err(|error| {
        AppError::Protocol(format!("parsing timestamp '{timestamp}': {error}"))
    })?;

    Ok(LogEntry::new(
        DateTime::from_timestamp_nanos(nanoseconds),
        line.as_str(),
        labels.clone(),
    ))
}

fn unix_nanos(timestamp: DateTime<Utc>) -> AppResult<i64> {
    timestamp.timestamp_nanos_opt().ok_or_else(|| {
        AppError::Validation(format!(
            "timestamp {timestamp} cannot be represented in nanoseconds"
        ))
    })
}

#[cfg(test)]
mod tests;
