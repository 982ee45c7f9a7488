//! Repository sync status and its state machine.
//!
//! ```text
//! pending ──▶ backfilling ──▶ active ──▶ syncing ──▶ active
//!    │             │                        │
//!    └─────────────┴──────▶ error ◀─────────┘
//! ```
//!
//! `error` and `active` are both re-enterable by a later sync. While a
//! repository is `backfilling` or `syncing`, new sync requests are rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoStatus {
    Pending,
    Backfilling,
    Syncing,
    Active,
    Error,
}

impl RepoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoStatus::Pending => "pending",
            RepoStatus::Backfilling => "backfilling",
            RepoStatus::Syncing => "syncing",
            RepoStatus::Active => "active",
            RepoStatus::Error => "error",
        }
    }

    /// True while a sync owns the repository.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RepoStatus::Syncing | RepoStatus::Backfilling)
    }

    /// The in-flight state a sync enters from a record that has
    /// `last_sync_at` set as given. Never-synced repositories backfill.
    pub fn in_flight_for(last_sync_at: i64) -> RepoStatus {
        if last_sync_at > 0 {
            RepoStatus::Syncing
        } else {
            RepoStatus::Backfilling
        }
    }
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RepoStatus::Pending),
            "backfilling" => Ok(RepoStatus::Backfilling),
            "syncing" => Ok(RepoStatus::Syncing),
            "active" => Ok(RepoStatus::Active),
            "error" => Ok(RepoStatus::Error),
            other => Err(format!("unknown repository status: '{}'", other)),
        }
    }
}
