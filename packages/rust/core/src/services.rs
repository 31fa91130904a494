//! Collaborator contracts consumed by the pipeline.
//!
//! The orchestrator is generic over these traits so the composition root
//! picks concrete HTTP clients and tests substitute in-memory fakes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use archdoc_shared::{ArchDocError, NamingArtifact, NamingRequest, Result, RetrievedChunk};

/// Text → fixed-dimension vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;
}

/// Hybrid (lexical + vector) search over the governance knowledge base.
///
/// An empty result list is a valid answer, not an error.
pub trait KnowledgeIndex: Send + Sync {
    fn hybrid_search(
        &self,
        query: &str,
        vector: &[f32],
        top_k: usize,
    ) -> impl Future<Output = Result<Vec<RetrievedChunk>>> + Send;
}

/// One chat-style generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Names the call in logs, e.g. `draft:hosting` or `review:hosting`.
    pub label: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Used both for section writing and for the qualitative review.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> impl Future<Output = Result<String>> + Send;
}

/// Resolves resource names. Failures travel inside the artifact.
pub trait NamingResolver: Send + Sync {
    fn resolve(&self, request: &NamingRequest) -> impl Future<Output = NamingArtifact> + Send;
}

// ---------------------------------------------------------------------------
// Shared-ownership forwarding
// ---------------------------------------------------------------------------

impl<T: Embedder> Embedder for Arc<T> {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send {
        (**self).embed(text)
    }
}

impl<T: KnowledgeIndex> KnowledgeIndex for Arc<T> {
    fn hybrid_search(
        &self,
        query: &str,
        vector: &[f32],
        top_k: usize,
    ) -> impl Future<Output = Result<Vec<RetrievedChunk>>> + Send {
        (**self).hybrid_search(query, vector, top_k)
    }
}

impl<T: TextGenerator> TextGenerator for Arc<T> {
    fn generate(&self, request: &GenerationRequest) -> impl Future<Output = Result<String>> + Send {
        (**self).generate(request)
    }
}

impl<T: NamingResolver> NamingResolver for Arc<T> {
    fn resolve(&self, request: &NamingRequest) -> impl Future<Output = NamingArtifact> + Send {
        (**self).resolve(request)
    }
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

/// Run `fut` under a deadline. Expiry maps to [`ArchDocError::Timeout`].
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, secs = limit.as_secs(), "external call timed out");
            Err(ArchDocError::timeout(operation, limit.as_secs()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_maps_to_transient_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ArchDocError>(1)
        };
        let err = with_timeout("embed", Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchDocError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let value = with_timeout("search", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = with_timeout::<u8, _>("search", Duration::from_secs(1), async {
            Err(ArchDocError::Retrieval("index offline".into()))
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("index offline"));
    }
}
