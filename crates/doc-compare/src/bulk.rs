/// Bulk whole-document extraction.
///
/// Trades the grounded path's many small retrieval + generation round trips
/// for one large structured call per document: every category's question is
/// submitted as one field of a single extraction request against the full
/// document text. Output shape matches the grounded path so the orchestrator
/// aggregates both identically.
use std::sync::Arc;

use async_trait::async_trait;
use compare_common::generate::{GenerationError, SchemaField, StructuredGenerator};
use compare_common::retrieval::ChunkStore;
use indexmap::IndexMap;
use tracing::warn;

use crate::extract::{AnswerExtraction, DocumentAnswers, MAX_ERROR_LEN};
use crate::model::{truncate_chars, AnswerValue, ValidatedDocument};

/// Multi-field extraction against a whole document.
#[async_trait]
pub trait BulkExtractionAdapter: Send + Sync {
    /// `fields` is the ordered list of (category, question) pairs; the result
    /// maps each category to the raw extracted value.
    async fn extract(
        &self,
        document: &ValidatedDocument,
        fields: &[(String, String)],
        model: &str,
    ) -> Result<IndexMap<String, String>, GenerationError>;
}

/// Production bulk adapter: fetches the document's full chunk text and makes
/// one structured generation call with a text field per category.
pub struct LlmBulkExtractor {
    chunks: Arc<dyn ChunkStore>,
    generator: Arc<dyn StructuredGenerator>,
}

impl LlmBulkExtractor {
    pub fn new(chunks: Arc<dyn ChunkStore>, generator: Arc<dyn StructuredGenerator>) -> Self {
        Self { chunks, generator }
    }
}

#[async_trait]
impl BulkExtractionAdapter for LlmBulkExtractor {
    async fn extract(
        &self,
        document: &ValidatedDocument,
        fields: &[(String, String)],
        model: &str,
    ) -> Result<IndexMap<String, String>, GenerationError> {
        let content = self
            .chunks
            .full_text(&document.chunk_table, &document.base_name)
            .await
            .map_err(|e| GenerationError::Source(e.to_string()))?;
        if content.trim().is_empty() {
            return Err(GenerationError::Source(format!(
                "no chunk text for '{}' in {}",
                document.base_name, document.chunk_table
            )));
        }

        let prompt = bulk_prompt(&content, fields);
        let schema: Vec<SchemaField> = fields
            .iter()
            .map(|(category, _)| SchemaField::text(category))
            .collect();

        let record = self.generator.generate(model, &prompt, &schema).await?;
        Ok(record
            .into_iter()
            .map(|(category, value)| {
                let text = value.as_text().unwrap_or_default().to_string();
                (category, text)
            })
            .collect())
    }
}

fn bulk_prompt(content: &str, fields: &[(String, String)]) -> String {
    let mut prompt = String::from("Document:\n\n");
    prompt.push_str(content);
    prompt.push_str("\n\nAnswer each of the following questions from the document above, in under \
                     100 words each. Use \"Not found in document\" when the document does not \
                     contain the information.\n\n");
    for (category, question) in fields {
        prompt.push_str(&format!("- {category}: {question}\n"));
    }
    prompt
}

/// `AnswerExtraction` strategy over a `BulkExtractionAdapter`.
pub struct BulkExtractor {
    adapter: Arc<dyn BulkExtractionAdapter>,
}

impl BulkExtractor {
    pub fn new(adapter: Arc<dyn BulkExtractionAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl AnswerExtraction for BulkExtractor {
    async fn extract_document(
        &self,
        document: &ValidatedDocument,
        categories: &IndexMap<String, String>,
        model: &str,
        _search_limit: usize,
    ) -> DocumentAnswers {
        let fields: Vec<(String, String)> = categories
            .iter()
            .map(|(category, question)| (category.clone(), question.clone()))
            .collect();

        let mut result = DocumentAnswers::default();
        match self.adapter.extract(document, &fields, model).await {
            Ok(values) => {
                for category in categories.keys() {
                    let answer = match values.get(category) {
                        Some(raw) => AnswerValue::from_model_text(raw),
                        None => AnswerValue::NotFound,
                    };
                    // Passage counts are a presence flag in bulk mode.
                    let flag = usize::from(answer.is_valid());
                    result.answers.insert(category.clone(), answer);
                    result.passage_counts.insert(category.clone(), flag);
                }
            }
            Err(e) => {
                // Recorded once per document; every category gets the error.
                warn!(file = %document.base_name, error = %e, "bulk extraction failed");
                let message = truncate_chars(&e.to_string(), MAX_ERROR_LEN);
                for category in categories.keys() {
                    result
                        .answers
                        .insert(category.clone(), AnswerValue::Error(message.clone()));
                    result.passage_counts.insert(category.clone(), 0);
                }
            }
        }
        result
    }

    fn method_name(&self) -> &'static str {
        "bulk_extract"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> ValidatedDocument {
        ValidatedDocument {
            file_name: "sow_acme.pdf".to_string(),
            file_type: "SOW".to_string(),
            chunk_table: "SOW_CHUNKS".to_string(),
            search_service: "SOW_SEARCH_SERVICE".to_string(),
            base_name: "sow_acme.pdf".to_string(),
        }
    }

    fn categories() -> IndexMap<String, String> {
        IndexMap::from([
            ("payment_terms".to_string(), "What are the payment terms?".to_string()),
            ("notice_period".to_string(), "What is the notice period?".to_string()),
        ])
    }

    struct StubBulkAdapter {
        values: Option<IndexMap<String, String>>,
    }

    #[async_trait]
    impl BulkExtractionAdapter for StubBulkAdapter {
        async fn extract(
            &self,
            _document: &ValidatedDocument,
            _fields: &[(String, String)],
            _model: &str,
        ) -> Result<IndexMap<String, String>, GenerationError> {
            match &self.values {
                Some(values) => Ok(values.clone()),
                None => Err(GenerationError::Source("stage unreadable".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn values_map_to_answers_with_presence_flags() {
        let extractor = BulkExtractor::new(Arc::new(StubBulkAdapter {
            values: Some(IndexMap::from([
                ("payment_terms".to_string(), "Net 60".to_string()),
                ("notice_period".to_string(), "".to_string()),
            ])),
        }));
        let result = extractor
            .extract_document(&doc(), &categories(), "claude-4-sonnet", 3)
            .await;
        assert_eq!(
            result.answers["payment_terms"],
            AnswerValue::Found("Net 60".to_string())
        );
        assert_eq!(result.answers["notice_period"], AnswerValue::NotFound);
        assert_eq!(result.passage_counts["payment_terms"], 1);
        assert_eq!(result.passage_counts["notice_period"], 0);
    }

    #[tokio::test]
    async fn missing_category_defaults_to_not_found() {
        let extractor = BulkExtractor::new(Arc::new(StubBulkAdapter {
            values: Some(IndexMap::from([(
                "payment_terms".to_string(),
                "Net 60".to_string(),
            )])),
        }));
        let result = extractor
            .extract_document(&doc(), &categories(), "claude-4-sonnet", 3)
            .await;
        assert_eq!(result.answers["notice_period"], AnswerValue::NotFound);
    }

    #[tokio::test]
    async fn adapter_failure_marks_every_category() {
        let extractor = BulkExtractor::new(Arc::new(StubBulkAdapter { values: None }));
        let result = extractor
            .extract_document(&doc(), &categories(), "claude-4-sonnet", 3)
            .await;
        assert_eq!(result.answers.len(), 2);
        for answer in result.answers.values() {
            match answer {
                AnswerValue::Error(message) => assert!(message.contains("stage unreadable")),
                other => panic!("expected error answer, got {other:?}"),
            }
        }
    }

    #[test]
    fn bulk_prompt_lists_every_field() {
        let fields = vec![
            ("payment_terms".to_string(), "What are the payment terms?".to_string()),
            ("notice_period".to_string(), "What is the notice period?".to_string()),
        ];
        let prompt = bulk_prompt("full document text", &fields);
        assert!(prompt.contains("full document text"));
        assert!(prompt.contains("- payment_terms: What are the payment terms?"));
        assert!(prompt.contains("- notice_period: What is the notice period?"));
    }
}
