/// Error types shared across the comparison crates.
///
/// These cover failures in infrastructure components (vector store, embeddings)
/// that back the retrieval and chunk-store adapters. Application-specific errors
/// live in the `doc-compare` crate and wrap `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("embedding error: {0}")]
    Embedding(String),
}
