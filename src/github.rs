//! GitHub GraphQL client.
//!
//! Implements [`UpstreamSource`] with one GraphQL request per sync: open
//! issues (optionally filtered by `since`) and open pull requests with the
//! paths of their first changed files.
//!
//! # Retry Strategy
//!
//! Same policy as the embedding providers:
//! - HTTP 429 and 5xx → retry with exponential backoff
//! - other 4xx → fail immediately (401 means the token was rejected)
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, ... capped at 32s
//!
//! A `200` carrying a GraphQL `errors` array, or no `repository`, is a
//! failure and is not retried.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use repo_index_core::upstream::{
    FetchQuery, FetchedItems, Issue, IssueState, PullRequest, PullRequestState, UpstreamSource,
};

use crate::config::GithubConfig;

pub const FETCH_REPO_DATA_QUERY: &str = r#"
query (
  $owner: String!
  $repo: String!
  $issuesFirst: Int!
  $issuesSince: DateTime
  $pullRequestsFirst: Int!
  $pullRequestsFilesFirst: Int!
) {
  repository(owner: $owner, name: $repo) {
    issues(first: $issuesFirst, filterBy: { states: OPEN, since: $issuesSince }) {
      nodes { id number title bodyText state }
    }
    pullRequests(first: $pullRequestsFirst, states: OPEN) {
      nodes {
        id number title bodyText state
        files(first: $pullRequestsFilesFirst) { nodes { path } }
      }
    }
  }
}
"#;

pub struct GithubClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    max_retries: u32,
}

impl GithubClient {
    pub fn new(config: &GithubConfig, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("repo-index/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            token,
            max_retries: config.max_retries,
        })
    }

    /// Client for the configured token, or `None` when the token variable is
    /// unset (syncs are then rejected as unauthorized).
    pub fn from_config(config: &GithubConfig) -> Result<Option<Self>> {
        match config.token() {
            Some(token) => Ok(Some(Self::new(config, token)?)),
            None => {
                warn!(
                    token_env = %config.token_env,
                    "no GitHub token configured; syncs will be rejected"
                );
                Ok(None)
            }
        }
    }
}

/// GraphQL variables for a fetch.
pub fn query_variables(query: &FetchQuery) -> serde_json::Value {
    serde_json::json!({
        "owner": query.owner,
        "repo": query.repo,
        "issuesFirst": query.issues_first,
        "issuesSince": query
            .since
            .map(|s| s.to_rfc3339_opts(SecondsFormat::Millis, true)),
        "pullRequestsFirst": query.pull_requests_first,
        "pullRequestsFilesFirst": query.files_first,
    })
}

#[async_trait]
impl UpstreamSource for GithubClient {
    async fn fetch(&self, query: &FetchQuery) -> Result<FetchedItems> {
        let body = serde_json::json!({
            "query": FETCH_REPO_DATA_QUERY,
            "variables": query_variables(query),
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, ?delay, "retrying GitHub fetch");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.api_url)
                .bearer_auth(&self.token)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let text = response.text().await?;
                        return parse_response(&text);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow!("GitHub API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 401 {
                        bail!("GitHub rejected the token (401): {}", body_text);
                    }
                    bail!("GitHub API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("GitHub fetch failed after retries")))
    }
}

// ============ Response parsing ============

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<Data>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct Data {
    repository: Option<Repository>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    issues: Connection<IssueNode>,
    pull_requests: Connection<PullRequestNode>,
}

#[derive(Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueNode {
    id: String,
    number: u64,
    title: String,
    #[serde(default)]
    body_text: Option<String>,
    state: IssueState,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestNode {
    id: String,
    number: u64,
    title: String,
    #[serde(default)]
    body_text: Option<String>,
    state: PullRequestState,
    #[serde(default)]
    files: Option<Connection<FileNode>>,
}

#[derive(Deserialize)]
struct FileNode {
    path: String,
}

/// Parse a GraphQL response body into fetched items.
pub fn parse_response(text: &str) -> Result<FetchedItems> {
    let response: GraphqlResponse = serde_json::from_str(text)
        .map_err(|e| anyhow!("Invalid GitHub response: {}", e))?;

    if !response.errors.is_empty() {
        let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
        bail!("GitHub GraphQL error: {}", messages.join("; "));
    }

    let repository = response
        .data
        .and_then(|d| d.repository)
        .ok_or_else(|| anyhow!("GitHub response has no repository"))?;

    let issues = repository
        .issues
        .nodes
        .into_iter()
        .flatten()
        .map(|n| Issue {
            id: n.id,
            number: n.number,
            title: n.title,
            body_text: n.body_text.unwrap_or_default(),
            state: n.state,
        })
        .collect();

    let pull_requests = repository
        .pull_requests
        .nodes
        .into_iter()
        .flatten()
        .map(|n| PullRequest {
            id: n.id,
            number: n.number,
            title: n.title,
            body_text: n.body_text.unwrap_or_default(),
            state: n.state,
            files: n
                .files
                .map(|f| f.nodes.into_iter().flatten().map(|f| f.path).collect())
                .unwrap_or_default(),
        })
        .collect();

    Ok(FetchedItems {
        issues,
        pull_requests,
    })
}
