//! Core data models: repository keys, indexed items, and the persisted
//! per-repository [`VectorObject`].
//!
//! The serialized field names (`syncedAt`, `pullRequests`, `hash`) are the
//! on-disk format of the compressed index and must stay stable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::status::RepoStatus;

/// Identity of a tracked repository: `(owner, repo)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoKey {
    pub owner: String,
    pub repo: String,
}

impl RepoKey {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// `"owner/repo"`, the identity tag stored in [`VectorObject::repo`].
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(Self::new(owner, repo))
            }
            _ => Err(format!("expected owner/repo, got '{}'", s)),
        }
    }
}

/// Open/closed state of an indexed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Open,
    Closed,
}

/// A vectorized issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueVector {
    pub id: String,
    pub number: u64,
    pub state: ItemState,
    pub vector: Vec<f32>,
}

/// A vectorized pull request, gated on its content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestVector {
    pub id: String,
    pub number: u64,
    pub state: ItemState,
    #[serde(rename = "hash")]
    pub content_hash: String,
    pub vector: Vec<f32>,
}

/// The persisted per-repository index, replaced as a whole on every sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorObject {
    /// `"owner/repo"`.
    pub repo: String,
    /// Epoch millis of the last successful write.
    pub synced_at: i64,
    #[serde(default)]
    pub issues: BTreeMap<String, IssueVector>,
    #[serde(default)]
    pub pull_requests: BTreeMap<String, PullRequestVector>,
}

impl VectorObject {
    /// An empty index for `key`, used on first sync.
    pub fn empty(key: &RepoKey) -> Self {
        Self {
            repo: key.full_name(),
            synced_at: 0,
            issues: BTreeMap::new(),
            pull_requests: BTreeMap::new(),
        }
    }

    /// Vector dimensionality shared by every entry, or `None` when empty.
    pub fn dims(&self) -> Option<usize> {
        self.issues
            .values()
            .map(|i| i.vector.len())
            .chain(self.pull_requests.values().map(|p| p.vector.len()))
            .next()
    }

    /// Total number of indexed items.
    pub fn len(&self) -> usize {
        self.issues.len() + self.pull_requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Repository metadata record, owned by the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    pub owner: String,
    pub repo: String,
    pub status: RepoStatus,
    /// Epoch millis; `0` means never synced.
    pub last_sync_at: i64,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RepositoryRecord {
    /// A fresh `pending` record.
    pub fn pending(key: &RepoKey, now: i64) -> Self {
        Self {
            owner: key.owner.clone(),
            repo: key.repo.clone(),
            status: RepoStatus::Pending,
            last_sync_at: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> RepoKey {
        RepoKey::new(&self.owner, &self.repo)
    }
}
