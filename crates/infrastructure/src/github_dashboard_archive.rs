//! GitHub contents API adapter storing dashboard backups as files.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashprune_application::DashboardArchive;
use dashprune_core::{AppError, AppResult};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::http_support::{body_for_error, join_segments, parse_base_url};

/// Default GitHub REST API base URL.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

const GITHUB_API_VERSION: &str = "2022-11-28";
const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const ARCHIVE_USER_AGENT: &str = "dashprune";

/// Repository identified as `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepository {
    owner: String,
    repo: String,
}

impl GitHubRepository {
    /// Creates a repository reference from non-empty parts.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> AppResult<Self> {
        let owner = owner.into();
        let repo = repo.into();
        if owner.is_empty() {
            return Err(AppError::Validation("owner cannot be empty".to_owned()));
        }
        if repo.is_empty() {
            return Err(AppError::Validation("repo cannot be empty".to_owned()));
        }

        Ok(Self { owner, repo })
    }

    /// Returns the repository owner.
    #[must_use]
    pub fn owner(&self) -> &str {
        self.owner.as_str()
    }

    /// Returns the repository name.
    #[must_use]
    pub fn repo(&self) -> &str {
        self.repo.as_str()
    }
}

impl FromStr for GitHubRepository {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split('/').collect();
        let [owner, repo] = parts.as_slice() else {
            return Err(AppError::Validation(format!(
                "repository must be in format 'owner/repo', got '{value}'"
            )));
        };

        Self::new(*owner, *repo)
    }
}

impl Display for GitHubRepository {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}/{}", self.owner, self.repo)
    }
}

/// Settings for [`GitHubDashboardArchive`].
#[derive(Debug, Clone)]
pub struct GitHubArchiveConfig {
    /// REST API base URL.
    pub api_url: String,
    /// Target repository.
    pub repository: GitHubRepository,
    /// Branch receiving backup commits.
    pub branch: String,
    /// Directory inside the repository holding backups.
    pub directory: String,
    /// Token with contents write access.
    pub token: String,
}

/// Dashboard archive committing definitions to `{directory}/{namespace}/{name}.json`.
#[derive(Clone)]
pub struct GitHubDashboardArchive {
    http_client: reqwest::Client,
    api_url: Url,
    repository: GitHubRepository,
    branch: String,
    directory: Vec<String>,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

impl GitHubDashboardArchive {
    /// Creates an archive client.
    pub fn new(http_client: reqwest::Client, config: GitHubArchiveConfig) -> AppResult<Self> {
        if config.token.trim().is_empty() {
            return Err(AppError::Validation(
                "github token must not be empty".to_owned(),
            ));
        }
        if config.branch.trim().is_empty() {
            return Err(AppError::Validation(
                "github branch must not be empty".to_owned(),
            ));
        }

        let directory: Vec<String> = config
            .directory
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        if directory.is_empty() {
            return Err(AppError::Validation(
                "github directory must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            http_client,
            api_url: parse_base_url("github", &config.api_url)?,
            repository: config.repository,
            branch: config.branch,
            directory,
            token: config.token,
        })
    }

    /// Returns the repository path a dashboard backup is written to.
    #[must_use]
    pub fn backup_path(&self, namespace: &str, name: &str) -> String {
        format!("{}/{namespace}/{name}.json", self.directory.join("/"))
    }

    fn contents_url(&self, namespace: &str, name: &str) -> AppResult<Url> {
        let file_name = format!("{name}.json");
        let segments = ["repos", self.repository.owner(), self.repository.repo(), "contents"]
            .into_iter()
            .chain(self.directory.iter().map(String::as_str))
            .chain([namespace, file_name.as_str()]);

        join_segments(&self.api_url, segments)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(USER_AGENT, ARCHIVE_USER_AGENT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }

    async fn existing_sha(&self, url: &Url) -> AppResult<Option<String>> {
        let mut url = url.clone();
        url.query_pairs_mut().append_pair("ref", self.branch.as_str());

        let response = self
            .request(self.http_client.get(url))
            .send()
            .await
            .map_err(|error| AppError::Transport(format!("requesting contents: {error}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
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
        let contents = serde_json::from_str::<ContentsResponse>(&body)
            .map_err(|error| AppError::Protocol(format!("decoding response: {error}")))?;

        Ok(Some(contents.sha))
    }

    async fn put_file(
        &self,
        url: Url,
        message: String,
        definition: &[u8],
        sha: Option<String>,
    ) -> AppResult<()> {
        let body = PutContentsRequest {
            message,
            content: STANDARD.encode(definition),
            branch: self.branch.as_str(),
            sha,
        };

        let response = self
            .request(self.http_client.put(url))
            .json(&body)
            .send()
            .await
            .map_err(|error| AppError::Transport(format!("writing contents: {error}")))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            let body = body_for_error(response).await;
            return Err(AppError::Protocol(format!(
                "unexpected status code: {}, body: {body}",
                status.as_u16()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl DashboardArchive for GitHubDashboardArchive {
    async fn backup_dashboard(
        &self,
        namespace: &str,
        name: &str,
        definition: &[u8],
    ) -> AppResult<()> {
        let path = self.backup_path(namespace, name);
        let url = self.contents_url(namespace, name)?;
        let message = format!("Back up deleted Grafana dashboard {namespace}/{name}");

        info!(
            repository = %self.repository,
            branch = %self.branch,
            path = %path,
            namespace,
            name,
            "backing up dashboard to github"
        );

        match self
            .existing_sha(&url)
            .await
            .map_err(|error| error.context("checking if file exists"))?
        {
            None => {
                self.put_file(url, message, definition, None)
                    .await
                    .map_err(|error| error.context("creating file"))?;
                info!(repository = %self.repository, path = %path, "created dashboard backup file");
            }
            Some(sha) => {
                self.put_file(url, message, definition, Some(sha))
                    .await
                    .map_err(|error| error.context("updating file"))?;
                info!(repository = %self.repository, path = %path, "updated dashboard backup file");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
