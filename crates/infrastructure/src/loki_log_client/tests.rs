use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::DateTime;
use dashprune_application::{LogPageSource, LogRangePageRequest};
use dashprune_core::AppError;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::test_server::serve;

use super::{LogStream, LokiLogClient};

type Captured = Arc<Mutex<Vec<(HashMap<String, String>, Option<String>)>>>;

fn page_request() -> LogRangePageRequest {
    LogRangePageRequest {
        query: r#"{service_name="grafana"} | logfmt"#.to_owned(),
        start: DateTime::from_timestamp_nanos(1_000),
        end: DateTime::from_timestamp_nanos(9_000),
        limit: 50,
    }
}

async fn loki_returning(status: StatusCode, body: Value) -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let requests = captured.clone();
    let router = Router::new().route(
        "/loki/api/v1/query_range",
        get(
            move |Query(params): Query<HashMap<String, String>>, headers: HeaderMap| {
                let requests = requests.clone();
                let body = body.clone();
                async move {
                    let tenant = headers
                        .get("X-Scope-OrgID")
                        .and_then(|value| value.to_str().ok())
                        .map(ToOwned::to_owned);
                    requests.lock().await.push((params, tenant));
                    (status, Json(body))
                }
            },
        ),
    );

    (serve(router).await, captured)
}

fn client(endpoint: &str, tenant_id: Option<&str>) -> LokiLogClient {
    LokiLogClient::new(
        reqwest::Client::new(),
        endpoint,
        tenant_id.map(ToOwned::to_owned),
    )
    .unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn query_range_merges_streams_in_timestamp_order() {
    let (endpoint, captured) = loki_returning(
        StatusCode::OK,
        json!({
            "status": "success",
            "data": {
                "resultType": "streams",
                "result": [
                    {
                        "stream": {"path": "/d/b"},
                        "values": [["3000", "third"], ["5000", "fifth"]]
                    },
                    {
                        "stream": {"path": "/d/a"},
                        "values": [["2000", "second"], ["4000", "fourth"]]
                    }
                ]
            }
        }),
    )
    .await;

    let entries = client(&endpoint, Some("tenant-a"))
        .query_range_page(&page_request())
        .await
        .unwrap_or_else(|_| unreachable!());

    let messages: Vec<&str> = entries.iter().map(|entry| entry.message()).collect();
    assert_eq!(messages, vec!["second", "third", "fourth", "fifth"]);
    assert_eq!(entries[0].label("path"), Some("/d/a"));
    assert_eq!(entries[0].timestamp(), DateTime::from_timestamp_nanos(2_000));

    let captured = captured.lock().await;
    let (params, tenant) = &captured[0];
    assert_eq!(params.get("query").map(String::as_str), Some(r#"{service_name="grafana"} | logfmt"#));
    assert_eq!(params.get("start").map(String::as_str), Some("1000"));
    assert_eq!(params.get("end").map(String::as_str), Some("9000"));
    assert_eq!(params.get("limit").map(String::as_str), Some("50"));
    assert_eq!(params.get("direction").map(String::as_str), Some("forward"));
    assert_eq!(tenant.as_deref(), Some("tenant-a"));
}

#[tokio::test]
async fn omits_tenant_header_when_unset() {
    let (endpoint, captured) = loki_returning(
        StatusCode::OK,
        json!({"status": "success", "data": {"result": []}}),
    )
    .await;

    let entries = client(&endpoint, Some("  ")).query_range_page(&page_request()).await;

    assert!(entries.is_ok_and(|entries| entries.is_empty()));
    assert_eq!(captured.lock().await[0].1, None);
}

#[tokio::test]
async fn non_ok_status_is_reported_with_body() {
    let (endpoint, _) = loki_returning(
        StatusCode::BAD_REQUEST,
        json!({"message": "parse error"}),
    )
    .await;

    let result = client(&endpoint, None).query_range_page(&page_request()).await;

    assert!(matches!(
        result,
        Err(AppError::Protocol(message))
            if message.contains("unexpected status code: 400") && message.contains("parse error")
    ));
}

#[tokio::test]
async fn failed_query_status_is_rejected() {
    let (endpoint, _) = loki_returning(
        StatusCode::OK,
        json!({"status": "error", "data": {"result": []}}),
    )
    .await;

    let result = client(&endpoint, None).query_range_page(&page_request()).await;

    assert!(matches!(
        result,
        Err(AppError::Protocol(message)) if message.contains("query failed with status: error")
    ));
}

#[tokio::test]
async fn malformed_values_are_rejected() {
    let (endpoint, _) = loki_returning(
        StatusCode::OK,
        json!({
            "status": "success",
            "data": {"result": [{"stream": {}, "values": [["1000"]]}]}
        }),
    )
    .await;

    let result = client(&endpoint, None).query_range_page(&page_request()).await;

    assert!(matches!(
        result,
        Err(AppError::Protocol(message)) if message.contains("invalid value format")
    ));
}

#[tokio::test]
async fn unparsable_timestamps_are_rejected() {
    let (endpoint, _) = loki_returning(
        StatusCode::OK,
        json!({
            "status": "success",
            "data": {"result": [{"stream": {}, "values": [["soon", "line"]]}]}
        }),
    )
    .await;

    let result = client(&endpoint, None).query_range_page(&page_request()).await;

    assert!(matches!(
        result,
        Err(AppError::Protocol(message)) if message.contains("parsing timestamp 'soon'")
    ));
}

#[tokio::test]
async fn undecodable_body_is_rejected() {
    let (endpoint, _) = loki_returning(StatusCode::OK, json!(["not", "an", "object"])).await;

    let result = client(&endpoint, None).query_range_page(&page_request()).await;

    assert!(matches!(
        result,
        Err(AppError::Protocol(message)) if message.contains("unmarshalling response")
    ));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let result = client("http://127.0.0.1:1", None)
        .query_range_page(&page_request())
        .await;

    assert!(matches!(result, Err(AppError::Transport(_))));
}

#[test]
fn rejects_invalid_endpoint() {
    assert!(LokiLogClient::new(reqwest::Client::new(), "loki:3100", None).is_err());
}

#[tokio::test]
async fn push_sends_streams_with_nanosecond_timestamps() {
    let pushed = Arc::new(Mutex::new(Vec::<Value>::new()));
    let bodies = pushed.clone();
    let router = Router::new().route(
        "/loki/api/v1/push",
        post(move |Json(body): Json<Value>| {
            let bodies = bodies.clone();
            async move {
                bodies.lock().await.push(body);
                StatusCode::NO_CONTENT
            }
        }),
    );
    let endpoint = serve(router).await;

    let result = client(&endpoint, None)
        .push(&[LogStream {
            labels: BTreeMap::from([("service_name".to_owned(), "grafana".to_owned())]),
            lines: vec![(DateTime::from_timestamp_nanos(42), "path=/d/a".to_owned())],
        }])
        .await;

    assert!(result.is_ok());
    assert_eq!(
        pushed.lock().await[0],
        json!({
            "streams": [{
                "stream": {"service_name": "grafana"},
                "values": [["42", "path=/d/a"]]
            }]
        })
    );
}

#[tokio::test]
async fn push_rejects_unexpected_status() {
    let router = Router::new().route("/loki/api/v1/push", post(|| async { StatusCode::OK }));
    let endpoint = serve(router).await;

    let result = client(&endpoint, None).push(&[]).await;

    assert!(matches!(result, Err(AppError::Protocol(_))));
}
