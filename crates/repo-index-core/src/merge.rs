//! Embedding merge: turn a [`ChangeSet`] into the next [`VectorObject`].
//!
//! The new object is built in fresh maps from
//! `previous - to_remove + to_carry_over + embedded`; the previous object
//! is only read, so a failure anywhere here leaves it exactly as it was.

use std::collections::BTreeMap;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::SyncError;
use crate::models::{IssueVector, ItemState, PullRequestVector, RepoKey, VectorObject};
use crate::plan::{ChangeSet, EmbedTarget};

/// The merged object plus what happened to produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub object: VectorObject,
    pub embedded: usize,
    pub carried_over: usize,
    pub removed: usize,
}

/// Embed `changes.to_embed` in one call and merge the results.
///
/// An empty batch never reaches the embedder. The returned vectors are
/// matched to their requests by position; a count or dimension mismatch,
/// or a non-finite component, fails the merge with
/// [`SyncError::EmbeddingService`].
pub async fn merge(
    key: &RepoKey,
    previous: Option<&VectorObject>,
    changes: &ChangeSet,
    embedder: &dyn Embedder,
    synced_at: i64,
) -> Result<MergeResult, SyncError> {
    let vectors = if changes.to_embed.is_empty() {
        Vec::new()
    } else {
        let texts = changes.texts();
        debug!(repo = %key, count = texts.len(), "requesting embeddings");
        embedder
            .embed(&texts)
            .await
            .map_err(|e| SyncError::EmbeddingService(format!("{:#}", e)))?
    };

    check_vectors(previous, changes, &vectors)?;

    let mut issues: BTreeMap<String, IssueVector> =
        previous.map(|p| p.issues.clone()).unwrap_or_default();
    let mut pull_requests: BTreeMap<String, PullRequestVector> =
        previous.map(|p| p.pull_requests.clone()).unwrap_or_default();

    let mut removed = 0;
    for id in &changes.to_remove {
        if issues.remove(id).is_some() {
            removed += 1;
        }
    }

    // Carried-over entries must already be in the copied map.
    for id in &changes.to_carry_over {
        if !pull_requests.contains_key(id) {
            return Err(SyncError::Storage(format!(
                "carry-over pull request '{}' is not in the previous index",
                id
            )));
        }
    }

    for (request, vector) in changes.to_embed.iter().zip(vectors) {
        match &request.target {
            EmbedTarget::Issue => {
                issues.insert(
                    request.id.clone(),
                    IssueVector {
                        id: request.id.clone(),
                        number: request.number,
                        state: ItemState::Open,
                        vector,
                    },
                );
            }
            EmbedTarget::PullRequest {
                state,
                content_hash,
            } => {
                pull_requests.insert(
                    request.id.clone(),
                    PullRequestVector {
                        id: request.id.clone(),
                        number: request.number,
                        state: *state,
                        content_hash: content_hash.clone(),
                        vector,
                    },
                );
            }
        }
    }

    Ok(MergeResult {
        object: VectorObject {
            repo: key.full_name(),
            synced_at,
            issues,
            pull_requests,
        },
        embedded: changes.to_embed.len(),
        carried_over: changes.to_carry_over.len(),
        removed,
    })
}

fn check_vectors(
    previous: Option<&VectorObject>,
    changes: &ChangeSet,
    vectors: &[Vec<f32>],
) -> Result<(), SyncError> {
    if vectors.len() != changes.to_embed.len() {
        return Err(SyncError::EmbeddingService(format!(
            "expected {} embeddings, got {}",
            changes.to_embed.len(),
            vectors.len()
        )));
    }

    let Some(first) = vectors.first() else {
        return Ok(());
    };
    let dims = previous.and_then(|p| p.dims()).unwrap_or(first.len());
    if dims == 0 {
        return Err(SyncError::EmbeddingService(
            "embedding service returned empty vectors".to_string(),
        ));
    }
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
        return Err(SyncError::EmbeddingService(format!(
            "embedding {} has {} dimensions, index uses {}",
            i,
            v.len(),
            dims
        )));
    }
    if let Some((i, _)) = vectors
        .iter()
        .enumerate()
        .find(|(_, v)| v.iter().any(|x| !x.is_finite()))
    {
        return Err(SyncError::EmbeddingService(format!(
            "embedding {} contains a non-finite value",
            i
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::EmbedRequest;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEmbedder {
        dims: usize,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32; self.dims])
                .collect())
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 2.0]])
        }
    }

    struct NonFiniteEmbedder(f32);

    #[async_trait]
    impl Embedder for NonFiniteEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![self.0, 1.0]).collect())
        }
    }

    fn key() -> RepoKey {
        RepoKey::new("acme", "widget")
    }

    fn issue_request(id: &str, text: &str) -> EmbedRequest {
        EmbedRequest {
            id: id.to_string(),
            number: 1,
            text: text.to_string(),
            target: EmbedTarget::Issue,
        }
    }

    fn previous() -> VectorObject {
        let mut obj = VectorObject::empty(&key());
        obj.synced_at = 10;
        obj.issues.insert(
            "I1".to_string(),
            IssueVector {
                id: "I1".to_string(),
                number: 1,
                state: ItemState::Open,
                vector: vec![9.0, 9.0],
            },
        );
        obj.pull_requests.insert(
            "P7".to_string(),
            PullRequestVector {
                id: "P7".to_string(),
                number: 7,
                state: ItemState::Open,
                content_hash: "h7".to_string(),
                vector: vec![7.0, 7.0],
            },
        );
        obj
    }

    #[tokio::test]
    async fn test_empty_batch_skips_embedder() {
        let embedder = FixedEmbedder::new(2);
        let prev = previous();
        let changes = ChangeSet {
            to_carry_over: vec!["P7".to_string()],
            ..Default::default()
        };
        let result = merge(&key(), Some(&prev), &changes, &embedder, 20)
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.object.pull_requests, prev.pull_requests);
        assert_eq!(result.object.issues, prev.issues);
        assert_eq!(result.object.synced_at, 20);
        assert_eq!(result.carried_over, 1);
    }

    #[tokio::test]
    async fn test_remove_and_insert() {
        let embedder = FixedEmbedder::new(2);
        let prev = previous();
        let changes = ChangeSet {
            to_embed: vec![issue_request("I2", "abc")],
            to_remove: vec!["I1".to_string(), "I404".to_string()],
            ..Default::default()
        };
        let result = merge(&key(), Some(&prev), &changes, &embedder, 20)
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert!(!result.object.issues.contains_key("I1"));
        assert_eq!(result.object.issues["I2"].vector, vec![3.0, 3.0]);
        assert_eq!(result.removed, 1);
        assert_eq!(result.object.repo, "acme/widget");
        // The input object is untouched.
        assert!(prev.issues.contains_key("I1"));
    }

    #[tokio::test]
    async fn test_pr_gets_hash_and_state() {
        let embedder = FixedEmbedder::new(2);
        let changes = ChangeSet {
            to_embed: vec![EmbedRequest {
                id: "P9".to_string(),
                number: 9,
                text: "x".to_string(),
                target: EmbedTarget::PullRequest {
                    state: ItemState::Closed,
                    content_hash: "h9".to_string(),
                },
            }],
            ..Default::default()
        };
        let result = merge(&key(), None, &changes, &embedder, 5).await.unwrap();
        let pr = &result.object.pull_requests["P9"];
        assert_eq!(pr.content_hash, "h9");
        assert_eq!(pr.state, ItemState::Closed);
        assert_eq!(pr.number, 9);
    }

    #[tokio::test]
    async fn test_count_mismatch_fails() {
        let changes = ChangeSet {
            to_embed: vec![issue_request("I1", "a"), issue_request("I2", "b")],
            ..Default::default()
        };
        let err = merge(&key(), None, &changes, &ShortEmbedder, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::EmbeddingService(_)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails() {
        let embedder = FixedEmbedder::new(3);
        let prev = previous();
        let changes = ChangeSet {
            to_embed: vec![issue_request("I1", "a")],
            ..Default::default()
        };
        let err = merge(&key(), Some(&prev), &changes, &embedder, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::EmbeddingService(_)));
    }

    #[tokio::test]
    async fn test_non_finite_vectors_fail() {
        let prev = previous();
        let changes = ChangeSet {
            to_embed: vec![issue_request("I2", "a")],
            ..Default::default()
        };
        for value in [f32::INFINITY, f32::NEG_INFINITY, f32::NAN] {
            let err = merge(&key(), Some(&prev), &changes, &NonFiniteEmbedder(value), 20)
                .await
                .unwrap_err();
            assert!(matches!(err, SyncError::EmbeddingService(_)), "{:?}", value);
        }
        // Also rejected with no previous index to take dims from.
        let err = merge(&key(), None, &changes, &NonFiniteEmbedder(f32::NAN), 20)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::EmbeddingService(_)));
    }
}
