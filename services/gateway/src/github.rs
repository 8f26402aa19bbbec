//! GitHub proxy
//!
//! All upstream GitHub calls happen here, with the token resolved from the
//! session injected server-side. Responses are normalized into one issue
//! schema at this boundary so nothing downstream ever parses
//! upstream-specific paths like `repository_url`.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

/// Single-page cap on issue listings; there is no pagination loop, so
/// users with more open issues than this see a truncated list.
const ISSUES_PAGE_SIZE: u32 = 100;

const USER_AGENT: &str = concat!("issue-triage-gateway/", env!("CARGO_PKG_VERSION"));

/// Custom error type for upstream GitHub failures
#[derive(Error, Debug)]
pub enum GithubError {
    /// The token behind the session was rejected upstream; the caller
    /// should treat this as a session-level failure, not a request-level one
    #[error("Your GitHub session is no longer valid. Please sign in again.")]
    SessionInvalid,

    /// Target repository or issue does not exist or is inaccessible
    #[error("{0}")]
    NotFound(String),

    /// Any other non-2xx upstream response, carrying upstream's message
    /// where one was provided
    #[error("{0}")]
    Api(String),

    /// Network-level failure talking to GitHub
    #[error("GitHub request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Issue state as GitHub understands it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueState::Open => write!(f, "open"),
            IssueState::Closed => write!(f, "closed"),
        }
    }
}

/// Issue label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub color: String,
}

/// Normalized issue schema served to clients
///
/// `summary` is the only field this system computes; it is attached per
/// request and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub state: String,
    pub labels: Vec<Label>,
    /// Owning repository as `owner/repo`
    pub repository: String,
    /// Author login
    pub user: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Issue as GitHub returns it, before normalization
#[derive(Debug, Deserialize)]
struct RawIssue {
    id: u64,
    number: u64,
    title: String,
    state: String,
    #[serde(default)]
    labels: Vec<Label>,
    repository_url: Option<String>,
    user: Option<RawUser>,
    body: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Present only when the "issue" is actually a pull request; GitHub
    /// serves both from the same namespace
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct UpstreamMessage {
    message: Option<String>,
}

/// Extract `owner/repo` from a GitHub-style repository API URL
/// (e.g. `https://api.github.com/repos/owner/repo`).
pub fn extract_repo_path(url: &str) -> Option<&str> {
    url.split_once("/repos/")
        .map(|(_, path)| path.trim_end_matches('/'))
        .filter(|path| !path.is_empty())
}

/// Build the search qualifier string for the assigned-issues query.
///
/// Each label becomes its own quoted `label:` qualifier; GitHub combines
/// qualifiers with AND semantics, which is the behavior we preserve.
fn build_search_query(labels: Option<&str>) -> String {
    let mut query = String::from("is:issue is:open assignee:@me");
    if let Some(labels) = labels {
        for label in labels.split(',').map(str::trim).filter(|l| !l.is_empty()) {
            query.push_str(&format!(" label:\"{}\"", label));
        }
    }
    query
}

/// Drop pull requests from a mixed issue/PR listing.
fn filter_pull_requests(items: Vec<RawIssue>) -> Vec<RawIssue> {
    items
        .into_iter()
        .filter(|item| item.pull_request.is_none())
        .collect()
}

fn normalize(raw: RawIssue, fallback_repo: Option<&str>) -> Issue {
    let repository = raw
        .repository_url
        .as_deref()
        .and_then(extract_repo_path)
        .map(str::to_string)
        .or_else(|| fallback_repo.map(str::to_string))
        .unwrap_or_default();

    Issue {
        id: raw.id,
        number: raw.number,
        title: raw.title,
        state: raw.state,
        labels: raw.labels,
        repository,
        user: raw.user.map(|u| u.login).unwrap_or_default(),
        body: raw.body,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        summary: None,
    }
}

/// Map a non-2xx upstream status to the error the client should see.
fn map_upstream_error(status: StatusCode, message: Option<String>, context: &str) -> GithubError {
    match status {
        StatusCode::UNAUTHORIZED => GithubError::SessionInvalid,
        StatusCode::NOT_FOUND => {
            GithubError::NotFound("Repository not found or you do not have access to it.".into())
        }
        _ => {
            let detail = message.unwrap_or_else(|| format!("GitHub returned status {}", status));
            GithubError::Api(format!("{}: {}", context, detail))
        }
    }
}

/// Client for the GitHub REST API
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
}

impl GithubClient {
    /// Create a new GitHub client against the given API base URL.
    ///
    /// Runs at startup; GitHub rejects requests without a User-Agent, so
    /// a client that cannot carry one must not come up at all.
    pub fn new(base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build GitHub client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// List open issues for the session's user.
    ///
    /// With `repo` set, queries that repository directly; otherwise runs a
    /// global search scoped to issues assigned to the authenticated user.
    /// One page only; pull requests are dropped from the result.
    pub async fn list_issues(
        &self,
        token: &str,
        repo: Option<&str>,
        labels: Option<&str>,
    ) -> Result<Vec<Issue>, GithubError> {
        let items = match repo {
            Some(repo) => self.list_repo_issues(token, repo, labels).await?,
            None => self.search_assigned_issues(token, labels).await?,
        };

        let issues: Vec<Issue> = filter_pull_requests(items)
            .into_iter()
            .map(|raw| normalize(raw, repo))
            .collect();

        if issues.len() as u32 >= ISSUES_PAGE_SIZE {
            warn!("Issue listing hit the single-page cap of {}", ISSUES_PAGE_SIZE);
        }
        info!("Listing {} issues", issues.len());

        Ok(issues)
    }

    async fn list_repo_issues(
        &self,
        token: &str,
        repo: &str,
        labels: Option<&str>,
    ) -> Result<Vec<RawIssue>, GithubError> {
        let mut query = vec![
            ("state".to_string(), "open".to_string()),
            ("per_page".to_string(), ISSUES_PAGE_SIZE.to_string()),
        ];
        if let Some(labels) = labels {
            // GitHub applies a comma-separated label list with AND semantics
            query.push(("labels".to_string(), labels.to_string()));
        }

        let response = self
            .http
            .get(format!("{}/repos/{}/issues", self.base_url, repo))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = upstream_message(response).await;
            return Err(map_upstream_error(status, message, "Failed to list issues"));
        }

        Ok(response.json().await?)
    }

    async fn search_assigned_issues(
        &self,
        token: &str,
        labels: Option<&str>,
    ) -> Result<Vec<RawIssue>, GithubError> {
        let response = self
            .http
            .get(format!("{}/search/issues", self.base_url))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .query(&[
                ("q", build_search_query(labels)),
                ("per_page", ISSUES_PAGE_SIZE.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = upstream_message(response).await;
            return Err(map_upstream_error(status, message, "Failed to list issues"));
        }

        let search: SearchResponse = response.json().await?;
        Ok(search.items)
    }

    /// Open or close a single issue. One PATCH, no retries; failures are
    /// surfaced immediately so the caller can report the issue unchanged.
    pub async fn set_issue_state(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        number: u64,
        state: IssueState,
    ) -> Result<Issue, GithubError> {
        let response = self
            .http
            .patch(format!(
                "{}/repos/{}/{}/issues/{}",
                self.base_url, owner, repo, number
            ))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(&serde_json::json!({ "state": state }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = upstream_message(response).await;
            let context = format!("Failed to mark issue as {}", state);
            return Err(map_upstream_error(status, message, &context));
        }

        info!("Marked {}/{}#{} as {}", owner, repo, number, state);

        let raw: RawIssue = response.json().await?;
        let fallback = format!("{}/{}", owner, repo);
        Ok(normalize(raw, Some(&fallback)))
    }
}

async fn upstream_message(response: reqwest::Response) -> Option<String> {
    response
        .json::<UpstreamMessage>()
        .await
        .ok()
        .and_then(|m| m.message)
}
