/// Query embedding wrapper around fastembed.
///
/// Retrieval only ever embeds the extraction question (documents are embedded
/// by the ingestion pipeline, which is a separate system), so this wrapper is
/// query-only. fastembed's `TextEmbedding` is synchronous and CPU-bound; every
/// call is dispatched through `tokio::task::spawn_blocking`.
///
/// nomic-embed-text-v1.5 expects task-prefixed inputs; queries are prefixed
/// with "search_query: " automatically.
use std::sync::Arc;

use crate::error::CommonError;

/// Dimensionality of nomic-embed-text-v1.5 vectors.
pub const EMBEDDING_DIM: usize = 768;

pub struct QueryEmbedder {
    model: Arc<fastembed::TextEmbedding>,
}

impl QueryEmbedder {
    /// Initialize the embedding model. Downloads it on first run (~300MB),
    /// synchronously inside a blocking task.
    pub async fn new() -> Result<Self, CommonError> {
        let model = tokio::task::spawn_blocking(|| {
            let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::NomicEmbedTextV15)
                .with_show_download_progress(true);
            fastembed::TextEmbedding::try_new(options)
        })
        .await
        .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
        .map_err(|e| CommonError::Embedding(format!("model initialization failed: {e}")))?;

        Ok(Self {
            model: Arc::new(model),
        })
    }

    /// Embed a single retrieval query.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, CommonError> {
        let prefixed = vec![format!("search_query: {query}")];
        let model = Arc::clone(&self.model);
        let mut results = tokio::task::spawn_blocking(move || model.embed(prefixed, None))
            .await
            .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
            .map_err(|e| CommonError::Embedding(format!("query embedding failed: {e}")))?;
        let embedding = results
            .pop()
            .ok_or_else(|| CommonError::Embedding("empty embedding result".to_string()))?;
        if embedding.len() != EMBEDDING_DIM {
            return Err(CommonError::Embedding(format!(
                "unexpected embedding dimension {} (want {EMBEDDING_DIM})",
                embedding.len()
            )));
        }
        Ok(embedding)
    }
}
