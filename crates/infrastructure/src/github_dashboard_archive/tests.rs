use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashprune_application::DashboardArchive;
use dashprune_core::AppError;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::test_server::serve;

use super::{GitHubArchiveConfig, GitHubDashboardArchive, GitHubRepository};

const CONTENTS_PATH: &str = "/repos/{owner}/{repo}/contents/{*path}";

#[derive(Default)]
struct FakeContents {
    files: HashMap<String, String>,
    lookups: Vec<(String, Option<String>)>,
    writes: Vec<(String, Value)>,
    authorized: bool,
    fail_lookups: bool,
}

type Contents = Arc<Mutex<FakeContents>>;

async fn get_contents(
    State(contents): State<Contents>,
    Path((owner, repo, path)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let mut contents = contents.lock().await;
    let full_path = format!("{owner}/{repo}/{path}");
    contents
        .lookups
        .push((full_path.clone(), params.get("ref").cloned()));

    if contents.fail_lookups {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "boom"})),
        );
    }

    match contents.files.get(&full_path) {
        Some(sha) => (StatusCode::OK, Json(json!({"sha": sha, "path": path}))),
        None => (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))),
    }
}

async fn put_contents(
    State(contents): State<Contents>,
    Path((owner, repo, path)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut contents = contents.lock().await;
    contents.authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some("Bearer gh-token")
        && headers
            .get("x-github-api-version")
            .is_some_and(|value| value == "2022-11-28")
        && headers.contains_key("user-agent");

    let full_path = format!("{owner}/{repo}/{path}");
    let created = !contents.files.contains_key(&full_path);
    let sha = format!("sha-{}", contents.writes.len() + 1);
    contents.files.insert(full_path.clone(), sha);
    contents.writes.push((full_path, body));

    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

async fn github(contents: Contents) -> String {
    let router = Router::new()
        .route(CONTENTS_PATH, get(get_contents).put(put_contents))
        .with_state(contents);
    serve(router).await
}

fn archive(api_url: &str) -> GitHubDashboardArchive {
    GitHubDashboardArchive::new(
        reqwest::Client::new(),
        GitHubArchiveConfig {
            api_url: api_url.to_owned(),
            repository: "acme/dashboards"
                .parse()
                .unwrap_or_else(|_| unreachable!()),
            branch: "main".to_owned(),
            directory: "backups/deleted".to_owned(),
            token: "gh-token".to_owned(),
        },
    )
    .unwrap_or_else(|_| unreachable!())
}

#[test]
fn parses_owner_and_repo() {
    let repository: GitHubRepository = "acme/dashboards"
        .parse()
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(repository.owner(), "acme");
    assert_eq!(repository.repo(), "dashboards");
    assert_eq!(repository.to_string(), "acme/dashboards");
}

#[test]
fn rejects_malformed_repositories() {
    for value in ["acme", "acme/dashboards/extra", "/dashboards", "acme/", ""] {
        assert!(
            matches!(value.parse::<GitHubRepository>(), Err(AppError::Validation(_))),
            "{value} should be rejected"
        );
    }
}

#[test]
fn backup_path_nests_namespace_under_directory() {
    let archive = archive("https://api.github.com");

    assert_eq!(
        archive.backup_path("team-a", "cpu"),
        "backups/deleted/team-a/cpu.json"
    );
}

#[tokio::test]
async fn creates_then_updates_backup_file() {
    let contents: Contents = Arc::new(Mutex::new(FakeContents::default()));
    let endpoint = github(contents.clone()).await;
    let archive = archive(&endpoint);

    let first = archive
        .backup_dashboard("default", "cpu", br#"{"title":"CPU"}"#)
        .await;
    let second = archive
        .backup_dashboard("default", "cpu", br#"{"title":"CPU v2"}"#)
        .await;

    assert!(first.is_ok());
    assert!(second.is_ok());

    let contents = contents.lock().await;
    assert!(contents.authorized);
    assert_eq!(
        contents.lookups,
        vec![
            (
                "acme/dashboards/backups/deleted/default/cpu.json".to_owned(),
                Some("main".to_owned())
            );
            2
        ]
    );

    let (path, created) = &contents.writes[0];
    assert_eq!(path, "acme/dashboards/backups/deleted/default/cpu.json");
    assert_eq!(
        created["message"],
        "Back up deleted Grafana dashboard default/cpu"
    );
    assert_eq!(created["branch"], "main");
    assert_eq!(created["content"], STANDARD.encode(br#"{"title":"CPU"}"#));
    assert!(created.get("sha").is_none());

    let (_, updated) = &contents.writes[1];
    assert_eq!(updated["sha"], "sha-1");
    assert_eq!(
        updated["content"],
        STANDARD.encode(br#"{"title":"CPU v2"}"#)
    );
}

#[tokio::test]
async fn failed_lookup_writes_nothing() {
    let contents: Contents = Arc::new(Mutex::new(FakeContents {
        fail_lookups: true,
        ..FakeContents::default()
    }));
    let endpoint = github(contents.clone()).await;

    let result = archive(&endpoint)
        .backup_dashboard("default", "cpu", b"{}")
        .await;

    assert!(matches!(
        result,
        Err(AppError::Protocol(message))
            if message.contains("checking if file exists") && message.contains("500")
    ));
    assert!(contents.lock().await.writes.is_empty());
}

#[tokio::test]
async fn rejected_write_is_reported() {
    let router = Router::new().route(
        CONTENTS_PATH,
        get(|| async { StatusCode::NOT_FOUND })
            .put(|| async { (StatusCode::CONFLICT, "branch protected") }),
    );
    let endpoint = serve(router).await;

    let result = archive(&endpoint)
        .backup_dashboard("default", "cpu", b"{}")
        .await;

    assert!(matches!(
        result,
        Err(AppError::Protocol(message))
            if message.contains("creating file") && message.contains("branch protected")
    ));
}

#[test]
fn rejects_missing_token() {
    let result = GitHubDashboardArchive::new(
        reqwest::Client::new(),
        GitHubArchiveConfig {
            api_url: "https://api.github.com".to_owned(),
            repository: GitHubRepository::new("acme", "dashboards")
                .unwrap_or_else(|_| unreachable!()),
            branch: "main".to_owned(),
            directory: "deleted-dashboards".to_owned(),
            token: String::new(),
        },
    );

    assert!(matches!(result, Err(AppError::Validation(_))));
}
