//! Upstream data source abstraction.
//!
//! The engine asks an [`UpstreamSource`] for the most relevant issues and
//! pull requests of a repository. The GitHub GraphQL implementation lives
//! in the application crate; tests use scripted sources.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Issue state as reported by GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueState {
    Open,
    Closed,
}

/// Pull request state as reported by GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

/// A fetched issue.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    /// Stable GitHub node id.
    pub id: String,
    pub number: u64,
    pub title: String,
    pub body_text: String,
    pub state: IssueState,
}

/// A fetched pull request with its changed file paths, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    /// Stable GitHub node id.
    pub id: String,
    pub number: u64,
    pub title: String,
    pub body_text: String,
    pub state: PullRequestState,
    pub files: Vec<String>,
}

/// Parameters of one upstream fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchQuery {
    pub owner: String,
    pub repo: String,
    /// Only issues updated since this instant (incremental mode).
    pub since: Option<DateTime<Utc>>,
    pub issues_first: u32,
    pub pull_requests_first: u32,
    pub files_first: u32,
}

/// Everything one fetch returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedItems {
    pub issues: Vec<Issue>,
    pub pull_requests: Vec<PullRequest>,
}

/// A source of repository issues and pull requests.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Fetch the items selected by `query`. Network failures, API errors,
    /// and malformed responses are all reported as `Err`.
    async fn fetch(&self, query: &FetchQuery) -> Result<FetchedItems>;
}
