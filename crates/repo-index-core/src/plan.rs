//! Change planning: decide which fetched items need embedding.
//!
//! # Rules
//!
//! | Item | Condition | Outcome |
//! |------|-----------|---------|
//! | Issue | `OPEN` | embed (issues are never hash-gated) |
//! | Issue | `CLOSED` | remove from the store |
//! | Pull request | new, or stored hash differs | embed |
//! | Pull request | stored hash equal | carry over the stored vector |
//!
//! Pull requests are never removed, whatever their state. The planner
//! works over any number of fetched items; duplicate ids within one batch
//! keep their first occurrence.

use std::collections::HashSet;

use crate::fingerprint::fingerprint;
use crate::models::{ItemState, VectorObject};
use crate::upstream::{Issue, IssueState, PullRequest, PullRequestState};

/// What a freshly embedded item becomes once its vector arrives.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedTarget {
    Issue,
    PullRequest {
        state: ItemState,
        content_hash: String,
    },
}

/// One text to embed, with the metadata to store next to its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedRequest {
    pub id: String,
    pub number: u64,
    pub text: String,
    pub target: EmbedTarget,
}

/// Output of [`plan`]: three disjoint id sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Items to embed, issues first, each kind in fetch order.
    pub to_embed: Vec<EmbedRequest>,
    /// Pull request ids whose stored vectors are reused as-is.
    pub to_carry_over: Vec<String>,
    /// Issue ids to delete from the store.
    pub to_remove: Vec<String>,
}

impl ChangeSet {
    /// The embedding batch, in `to_embed` order.
    pub fn texts(&self) -> Vec<String> {
        self.to_embed.iter().map(|r| r.text.clone()).collect()
    }
}

/// Text sent to the embedding service for an issue.
pub fn issue_text(issue: &Issue) -> String {
    format!("{}\n\n{}", issue.title, issue.body_text)
}

/// Text sent to the embedding service for a pull request.
pub fn pull_request_text(pr: &PullRequest) -> String {
    let mut text = format!("{}\n\n{}", pr.title, pr.body_text);
    if !pr.files.is_empty() {
        text.push_str("\n\nFiles changed:\n");
        text.push_str(&pr.files.join("\n"));
    }
    text
}

/// Content hash of a pull request over title, body, and file paths.
pub fn pull_request_hash(pr: &PullRequest) -> String {
    fingerprint(&pr.title, &pr.body_text, pr.files.as_slice())
}

/// Compare fetched items against the previous store.
pub fn plan(
    previous: Option<&VectorObject>,
    issues: &[Issue],
    pull_requests: &[PullRequest],
) -> ChangeSet {
    let mut changes = ChangeSet::default();

    let mut seen: HashSet<&str> = HashSet::new();
    for issue in issues {
        if !seen.insert(issue.id.as_str()) {
            continue;
        }
        match issue.state {
            IssueState::Open => changes.to_embed.push(EmbedRequest {
                id: issue.id.clone(),
                number: issue.number,
                text: issue_text(issue),
                target: EmbedTarget::Issue,
            }),
            IssueState::Closed => changes.to_remove.push(issue.id.clone()),
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for pr in pull_requests {
        if !seen.insert(pr.id.as_str()) {
            continue;
        }
        let content_hash = pull_request_hash(pr);
        let stored_hash = previous
            .and_then(|p| p.pull_requests.get(&pr.id))
            .map(|stored| stored.content_hash.as_str());

        if stored_hash == Some(content_hash.as_str()) {
            changes.to_carry_over.push(pr.id.clone());
        } else {
            let state = match pr.state {
                PullRequestState::Open => ItemState::Open,
                PullRequestState::Closed | PullRequestState::Merged => ItemState::Closed,
            };
            changes.to_embed.push(EmbedRequest {
                id: pr.id.clone(),
                number: pr.number,
                text: pull_request_text(pr),
                target: EmbedTarget::PullRequest {
                    state,
                    content_hash,
                },
            });
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IssueVector, PullRequestVector, RepoKey};

    fn issue(id: &str, number: u64, state: IssueState) -> Issue {
        Issue {
            id: id.to_string(),
            number,
            title: format!("Issue {}", number),
            body_text: "Something is broken".to_string(),
            state,
        }
    }

    fn pr(id: &str, number: u64, files: &[&str]) -> PullRequest {
        PullRequest {
            id: id.to_string(),
            number,
            title: format!("PR {}", number),
            body_text: "Fixes it".to_string(),
            state: PullRequestState::Open,
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn store_with_pr(p: &PullRequest) -> VectorObject {
        let mut obj = VectorObject::empty(&RepoKey::new("acme", "widget"));
        obj.pull_requests.insert(
            p.id.clone(),
            PullRequestVector {
                id: p.id.clone(),
                number: p.number,
                state: ItemState::Open,
                content_hash: pull_request_hash(p),
                vector: vec![1.0, 0.0],
            },
        );
        obj
    }

    #[test]
    fn test_open_issue_always_embedded() {
        let mut prev = VectorObject::empty(&RepoKey::new("acme", "widget"));
        prev.issues.insert(
            "I1".to_string(),
            IssueVector {
                id: "I1".to_string(),
                number: 1,
                state: ItemState::Open,
                vector: vec![1.0, 0.0],
            },
        );
        let changes = plan(Some(&prev), &[issue("I1", 1, IssueState::Open)], &[]);
        assert_eq!(changes.to_embed.len(), 1);
        assert_eq!(changes.to_embed[0].target, EmbedTarget::Issue);
        assert!(changes.to_carry_over.is_empty());
        assert!(changes.to_remove.is_empty());
    }

    #[test]
    fn test_closed_issue_removed_even_if_unknown() {
        let changes = plan(None, &[issue("I9", 9, IssueState::Closed)], &[]);
        assert!(changes.to_embed.is_empty());
        assert_eq!(changes.to_remove, vec!["I9".to_string()]);
    }

    #[test]
    fn test_new_pr_embedded_with_hash() {
        let p = pr("P7", 7, &["a.ts", "b.ts"]);
        let changes = plan(None, &[], &[p.clone()]);
        assert_eq!(changes.to_embed.len(), 1);
        match &changes.to_embed[0].target {
            EmbedTarget::PullRequest {
                state,
                content_hash,
            } => {
                assert_eq!(*state, ItemState::Open);
                assert_eq!(content_hash, &fingerprint("PR 7", "Fixes it", &["a.ts", "b.ts"]));
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_unchanged_pr_carried_over() {
        let p = pr("P7", 7, &["a.ts", "b.ts"]);
        let prev = store_with_pr(&p);
        let changes = plan(Some(&prev), &[], &[p]);
        assert!(changes.to_embed.is_empty());
        assert_eq!(changes.to_carry_over, vec!["P7".to_string()]);
    }

    #[test]
    fn test_changed_pr_reembedded() {
        let p = pr("P7", 7, &["a.ts", "b.ts"]);
        let prev = store_with_pr(&p);
        let reordered = pr("P7", 7, &["b.ts", "a.ts"]);
        let changes = plan(Some(&prev), &[], &[reordered]);
        assert_eq!(changes.to_embed.len(), 1);
        assert!(changes.to_carry_over.is_empty());
    }

    #[test]
    fn test_merged_pr_kept_as_closed() {
        let mut p = pr("P8", 8, &[]);
        p.state = PullRequestState::Merged;
        let changes = plan(None, &[], &[p]);
        assert!(changes.to_remove.is_empty());
        assert!(matches!(
            changes.to_embed[0].target,
            EmbedTarget::PullRequest {
                state: ItemState::Closed,
                ..
            }
        ));
    }

    #[test]
    fn test_batch_order_issues_then_prs() {
        let changes = plan(
            None,
            &[issue("I1", 1, IssueState::Open), issue("I2", 2, IssueState::Open)],
            &[pr("P7", 7, &["a.ts"])],
        );
        let ids: Vec<&str> = changes.to_embed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["I1", "I2", "P7"]);
        assert_eq!(changes.texts()[0], "Issue 1\n\nSomething is broken");
        assert_eq!(changes.texts()[2], "PR 7\n\nFixes it\n\nFiles changed:\na.ts");
    }

    #[test]
    fn test_duplicate_ids_first_wins() {
        let changes = plan(
            None,
            &[issue("I1", 1, IssueState::Open), issue("I1", 1, IssueState::Closed)],
            &[],
        );
        assert_eq!(changes.to_embed.len(), 1);
        assert!(changes.to_remove.is_empty());
    }
}
