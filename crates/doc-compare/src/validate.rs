/// Request validation for the file list.
///
/// Takes the caller-supplied file configuration as raw JSON, checks shape and
/// field content, normalizes types, derives the chunk-table / search-service
/// names, and confirms each document actually has chunks in its type's table.
/// Any failure here is fatal to the whole request.
use compare_common::retrieval::ChunkStore;

use crate::config::{self, MAX_FILES};
use crate::error::AppError;
use crate::model::{base_file_name, ValidatedDocument};

pub async fn validate_files(
    raw: &serde_json::Value,
    store: &dyn ChunkStore,
) -> Result<Vec<ValidatedDocument>, AppError> {
    let entries = raw
        .as_array()
        .ok_or_else(|| AppError::Validation("file configuration must be a JSON array".to_string()))?;

    if entries.is_empty() {
        return Err(AppError::Validation(
            "at least one file is required".to_string(),
        ));
    }
    if entries.len() > MAX_FILES {
        return Err(AppError::Validation(format!(
            "Maximum {MAX_FILES} files allowed per comparison, got {}",
            entries.len()
        )));
    }

    let mut documents = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let file_name = string_field(entry, "file_name", index)?;
        let file_type = string_field(entry, "file_type", index)?.to_uppercase();

        let document = ValidatedDocument {
            chunk_table: config::chunk_table(&file_type),
            search_service: config::search_service(&file_type),
            base_name: base_file_name(&file_name).to_string(),
            file_name,
            file_type,
        };

        // Point lookup, not a scan: the store only needs equality matching.
        let count = store
            .count_matching(&document.chunk_table, &document.base_name)
            .await?;
        if count == 0 {
            return Err(AppError::Validation(format!(
                "File '{}' not found in {}",
                document.file_name, document.chunk_table
            )));
        }

        documents.push(document);
    }

    Ok(documents)
}

fn string_field(entry: &serde_json::Value, field: &str, index: usize) -> Result<String, AppError> {
    let value = entry
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::Validation(format!("file entry {index} is missing {field}")))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!(
            "file entry {index} has an empty {field}"
        )));
    }
    Ok(trimmed.to_string())
}
