/// LanceDB wrapper for the document chunk tables.
///
/// Each document type owns one chunk table (populated by the ingestion
/// pipeline, not by this system). Expected schema:
/// - file_name: Utf8 (not null) — base file name the chunk belongs to
/// - chunk_text: Utf8 (not null) — the chunk content
/// - embedding: FixedSizeList<Float32, 768> (not null)
///
/// This wrapper exposes the three operations the engine needs: filtered
/// vector search, a point-lookup existence count for validation, and a full
/// chunk fetch for bulk extraction.
use arrow_array::RecordBatch;
use lancedb::query::{ExecutableQuery, QueryBase};
use tracing::warn;

use crate::error::CommonError;

pub struct VectorStore {
    db: lancedb::Connection,
}

impl VectorStore {
    /// Connect to a LanceDB database at the given filesystem path.
    pub async fn connect(path: &str) -> Result<Self, CommonError> {
        let db = lancedb::connect(path)
            .execute()
            .await
            .map_err(|e| CommonError::VectorStore(format!("connection failed: {e}")))?;
        Ok(Self { db })
    }

    /// Search a chunk table for the nearest vectors to `query_embedding`,
    /// restricted to rows whose `file_name` equals `file_name` exactly.
    ///
    /// Returns up to `limit` results as RecordBatches, including the
    /// `_distance` column added by LanceDB.
    pub async fn search_passages(
        &self,
        table_name: &str,
        query_embedding: &[f32],
        file_name: &str,
        limit: usize,
    ) -> Result<Vec<RecordBatch>, CommonError> {
        let table = self
            .db
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| CommonError::VectorStore(format!("open table failed: {e}")))?;

        let results = table
            .vector_search(query_embedding)
            .map_err(|e| CommonError::VectorStore(format!("vector search setup failed: {e}")))?
            .only_if(file_name_filter(file_name))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| CommonError::VectorStore(format!("vector search failed: {e}")))?;

        futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| CommonError::VectorStore(format!("collecting search results failed: {e}")))
    }

    /// Count rows in a chunk table whose `file_name` matches exactly.
    ///
    /// A missing table counts as zero matches: the caller treats both "table
    /// absent" and "file absent" as the document not being indexed.
    pub async fn count_matching(
        &self,
        table_name: &str,
        file_name: &str,
    ) -> Result<usize, CommonError> {
        let table = match self.db.open_table(table_name).execute().await {
            Ok(t) => t,
            Err(e) => {
                warn!(table = table_name, error = %e, "chunk table not available");
                return Ok(0);
            }
        };

        table
            .count_rows(Some(file_name_filter(file_name)))
            .await
            .map_err(|e| CommonError::VectorStore(format!("count rows failed: {e}")))
    }

    /// Fetch every chunk of a file, in stored order.
    pub async fn fetch_chunks(
        &self,
        table_name: &str,
        file_name: &str,
    ) -> Result<Vec<RecordBatch>, CommonError> {
        let table = self
            .db
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| CommonError::VectorStore(format!("open table failed: {e}")))?;

        let results = table
            .query()
            .only_if(file_name_filter(file_name))
            .execute()
            .await
            .map_err(|e| CommonError::VectorStore(format!("chunk fetch failed: {e}")))?;

        futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| CommonError::VectorStore(format!("collecting chunks failed: {e}")))
    }
}

/// Build the exact-match filter on `file_name`.
///
/// LanceDB filters use DataFusion SQL syntax; single quotes in the value are
/// doubled to keep the literal intact.
fn file_name_filter(file_name: &str) -> String {
    format!("file_name = '{}'", file_name.replace('\'', "''"))
}
