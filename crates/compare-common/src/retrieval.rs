/// Retrieval and chunk-store adapter seams.
///
/// The engine treats passage retrieval and chunk storage as opaque
/// capabilities behind these traits. The production implementations embed the
/// query with fastembed and search LanceDB; tests substitute deterministic
/// stubs.
use std::sync::Arc;

use arrow_array::{Array, RecordBatch, StringArray};
use async_trait::async_trait;
use tracing::info;

use crate::embedding::QueryEmbedder;
use crate::error::CommonError;
use crate::vectorstore::VectorStore;

/// A retrieved text snippet used as grounding context for one extraction
/// question. Ephemeral: produced by retrieval, consumed by the extractor,
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub text: String,
    pub source_file: String,
}

/// Top-k relevant-passage retrieval for one document.
///
/// `search_service` names the index to query; `file_name` must match the
/// stored base file name exactly. Implementations return an empty vector on
/// no match and never treat "no results" as an error.
#[async_trait]
pub trait RetrievalAdapter: Send + Sync {
    async fn search(
        &self,
        search_service: &str,
        query: &str,
        file_name: &str,
        limit: usize,
    ) -> Result<Vec<Passage>, CommonError>;
}

/// Point lookups against the chunk tables owned by the ingestion pipeline.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Count chunks in `table` whose file name matches exactly. Used only for
    /// request validation.
    async fn count_matching(&self, table: &str, file_name: &str) -> Result<usize, CommonError>;

    /// Concatenated text of every chunk of the file, for whole-document
    /// extraction.
    async fn full_text(&self, table: &str, file_name: &str) -> Result<String, CommonError>;
}

/// Production retriever: embeds the query and searches the LanceDB table
/// named by the search service.
pub struct LanceRetriever {
    embedder: Arc<QueryEmbedder>,
    store: Arc<VectorStore>,
}

impl LanceRetriever {
    pub fn new(embedder: Arc<QueryEmbedder>, store: Arc<VectorStore>) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl RetrievalAdapter for LanceRetriever {
    async fn search(
        &self,
        search_service: &str,
        query: &str,
        file_name: &str,
        limit: usize,
    ) -> Result<Vec<Passage>, CommonError> {
        let query_embedding = self.embedder.embed_query(query).await?;

        // The search service name doubles as the LanceDB table name.
        let batches = self
            .store
            .search_passages(search_service, &query_embedding, file_name, limit)
            .await?;

        let passages = extract_passages(&batches, file_name);
        info!(
            service = search_service,
            file = file_name,
            count = passages.len(),
            "passages retrieved"
        );
        Ok(passages)
    }
}

/// Production chunk store over the same LanceDB connection.
pub struct LanceChunkStore {
    store: Arc<VectorStore>,
}

impl LanceChunkStore {
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChunkStore for LanceChunkStore {
    async fn count_matching(&self, table: &str, file_name: &str) -> Result<usize, CommonError> {
        self.store.count_matching(table, file_name).await
    }

    async fn full_text(&self, table: &str, file_name: &str) -> Result<String, CommonError> {
        let batches = self.store.fetch_chunks(table, file_name).await?;
        let mut parts = Vec::new();
        for batch in &batches {
            let Some(text_col) = get_string_column(batch, "chunk_text") else {
                continue;
            };
            for row in 0..batch.num_rows() {
                parts.push(text_col.value(row).to_string());
            }
        }
        Ok(parts.join("\n\n"))
    }
}

/// Decode `Passage` values from search result batches.
///
/// Expected columns: file_name (Utf8), chunk_text (Utf8). Batches missing the
/// text column are skipped with a warning.
fn extract_passages(batches: &[RecordBatch], fallback_source: &str) -> Vec<Passage> {
    let mut passages = Vec::new();
    for batch in batches {
        let Some(text_col) = get_string_column(batch, "chunk_text") else {
            tracing::warn!("search result batch missing chunk_text column");
            continue;
        };
        let file_col = get_string_column(batch, "file_name");

        for row in 0..batch.num_rows() {
            let source_file = file_col
                .map(|c| c.value(row).to_string())
                .unwrap_or_else(|| fallback_source.to_string());
            passages.push(Passage {
                text: text_col.value(row).to_string(),
                source_file,
            });
        }
    }
    passages
}

fn get_string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    let idx = batch.schema().index_of(name).ok()?;
    batch.column(idx).as_any().downcast_ref::<StringArray>()
}
