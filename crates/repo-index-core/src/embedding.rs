//! Embedding service abstraction.
//!
//! Concrete providers (OpenAI, Ollama) live in the application crate and
//! are adapted to [`Embedder`] there.

use anyhow::Result;
use async_trait::async_trait;

/// Turns an ordered batch of texts into an ordered batch of vectors.
///
/// Implementations must return exactly one vector per input text, in input
/// order, all of the same length. A failure fails the whole batch.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
