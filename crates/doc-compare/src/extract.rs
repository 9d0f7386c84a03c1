/// Answer extraction strategies.
///
/// `AnswerExtraction` is the seam between the orchestrator and the two ways
/// of getting answers out of a document: the grounded per-category path here,
/// and the bulk whole-document path in `bulk.rs`. The seam is document-major
/// (one call per document covering every category) because the bulk variant
/// needs the full category set in a single round trip; both strategies
/// produce the same shape so aggregation is shared.
///
/// Extraction never returns `Err`: every adapter failure is converted to an
/// error-valued answer for the affected (document, category) pair only.
use std::sync::Arc;

use async_trait::async_trait;
use compare_common::generate::{SchemaField, StructuredGenerator};
use compare_common::retrieval::{Passage, RetrievalAdapter};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::model::{truncate_chars, AnswerValue, ValidatedDocument};

/// Cap on embedded error messages inside sentinel answers.
pub(crate) const MAX_ERROR_LEN: usize = 100;

/// All answers extracted from one document, keyed by category.
#[derive(Debug, Clone, Default)]
pub struct DocumentAnswers {
    pub answers: IndexMap<String, AnswerValue>,
    /// category -> passages used (presence flag in bulk mode).
    pub passage_counts: IndexMap<String, usize>,
}

#[async_trait]
pub trait AnswerExtraction: Send + Sync {
    /// Extract an answer for every category of `categories` from one
    /// document. Infallible by contract: failures become `AnswerValue::Error`
    /// entries.
    async fn extract_document(
        &self,
        document: &ValidatedDocument,
        categories: &IndexMap<String, String>,
        model: &str,
        search_limit: usize,
    ) -> DocumentAnswers;

    /// Label recorded on the `ComparisonResult`.
    fn method_name(&self) -> &'static str;
}

/// Per-category, retrieval-grounded extraction: each question gets its own
/// top-k passage retrieval and its own generation call. No caching across
/// categories.
pub struct GroundedExtractor {
    retrieval: Arc<dyn RetrievalAdapter>,
    generator: Arc<dyn StructuredGenerator>,
}

impl GroundedExtractor {
    pub fn new(
        retrieval: Arc<dyn RetrievalAdapter>,
        generator: Arc<dyn StructuredGenerator>,
    ) -> Self {
        Self {
            retrieval,
            generator,
        }
    }

    async fn answer_one(
        &self,
        document: &ValidatedDocument,
        question: &str,
        model: &str,
        search_limit: usize,
    ) -> (AnswerValue, usize) {
        let passages = match self
            .retrieval
            .search(
                &document.search_service,
                question,
                &document.base_name,
                search_limit,
            )
            .await
        {
            Ok(passages) => passages,
            Err(e) => {
                warn!(file = %document.base_name, error = %e, "retrieval failed");
                return (
                    AnswerValue::Error(truncate_chars(&e.to_string(), MAX_ERROR_LEN)),
                    0,
                );
            }
        };

        if passages.is_empty() {
            debug!(file = %document.base_name, "no passages retrieved, skipping generation");
            return (AnswerValue::NotFound, 0);
        }

        let prompt = grounded_prompt(&passages, question);
        let answer = match self
            .generator
            .generate(model, &prompt, &[SchemaField::text("answer")])
            .await
        {
            Ok(record) => {
                let text = record
                    .get("answer")
                    .and_then(|v| v.as_text())
                    .unwrap_or_default();
                AnswerValue::from_model_text(text)
            }
            Err(e) => {
                warn!(file = %document.base_name, error = %e, "answer generation failed");
                AnswerValue::Error(truncate_chars(&e.to_string(), MAX_ERROR_LEN))
            }
        };

        (answer, passages.len())
    }
}

#[async_trait]
impl AnswerExtraction for GroundedExtractor {
    async fn extract_document(
        &self,
        document: &ValidatedDocument,
        categories: &IndexMap<String, String>,
        model: &str,
        search_limit: usize,
    ) -> DocumentAnswers {
        let mut result = DocumentAnswers::default();
        for (category, question) in categories {
            let (answer, passage_count) = self
                .answer_one(document, question, model, search_limit)
                .await;
            result.answers.insert(category.clone(), answer);
            result.passage_counts.insert(category.clone(), passage_count);
        }
        result
    }

    fn method_name(&self) -> &'static str {
        "grounded_search"
    }
}

/// Build the grounded prompt: passages labeled by source file, then the
/// question, then the answer-length and "not found" instructions.
fn grounded_prompt(passages: &[Passage], question: &str) -> String {
    let mut prompt = String::from(
        "Use only the following document excerpts to answer the question.\n\n",
    );
    for passage in passages {
        prompt.push_str(&format!("[{}]\n{}\n\n", passage.source_file, passage.text));
    }
    prompt.push_str(&format!(
        "Question: {question}\n\nAnswer in under 100 words. If the excerpts do not contain the \
         information, answer \"Not specified\" or \"Not found\"."
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use compare_common::error::CommonError;
    use compare_common::generate::{FieldValue, GeneratedRecord, GenerationError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doc() -> ValidatedDocument {
        ValidatedDocument {
            file_name: "@MSA_STAGE/msa_acme.pdf".to_string(),
            file_type: "MSA".to_string(),
            chunk_table: "MSA_CHUNKS".to_string(),
            search_service: "MSA_SEARCH_SERVICE".to_string(),
            base_name: "msa_acme.pdf".to_string(),
        }
    }

    fn categories() -> IndexMap<String, String> {
        IndexMap::from([(
            "payment_terms".to_string(),
            "What are the payment terms?".to_string(),
        )])
    }

    struct StubRetrieval {
        passages: Vec<Passage>,
        fail: bool,
    }

    #[async_trait]
    impl RetrievalAdapter for StubRetrieval {
        async fn search(
            &self,
            _service: &str,
            _query: &str,
            _file_name: &str,
            _limit: usize,
        ) -> Result<Vec<Passage>, CommonError> {
            if self.fail {
                return Err(CommonError::VectorStore("index offline".to_string()));
            }
            Ok(self.passages.clone())
        }
    }

    struct StubGenerator {
        answer: Option<String>,
        calls: AtomicUsize,
    }

    impl StubGenerator {
        fn answering(text: &str) -> Self {
            Self {
                answer: Some(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                answer: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StructuredGenerator for StubGenerator {
        async fn generate(
            &self,
            _model: &str,
            _prompt: &str,
            _schema: &[SchemaField],
        ) -> Result<GeneratedRecord, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.answer {
                Some(text) => Ok(GeneratedRecord::from([(
                    "answer".to_string(),
                    FieldValue::Text(text.clone()),
                )])),
                None => Err(GenerationError::NoContent),
            }
        }
    }

    fn passages(n: usize) -> Vec<Passage> {
        (0..n)
            .map(|i| Passage {
                text: format!("excerpt {i}"),
                source_file: "msa_acme.pdf".to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn answer_comes_back_with_passage_count() {
        let generator = Arc::new(StubGenerator::answering("Net 45 days"));
        let extractor = GroundedExtractor::new(
            Arc::new(StubRetrieval {
                passages: passages(3),
                fail: false,
            }),
            Arc::clone(&generator) as Arc<dyn StructuredGenerator>,
        );
        let result = extractor
            .extract_document(&doc(), &categories(), "claude-4-sonnet", 3)
            .await;
        assert_eq!(
            result.answers["payment_terms"],
            AnswerValue::Found("Net 45 days".to_string())
        );
        assert_eq!(result.passage_counts["payment_terms"], 3);
    }

    #[tokio::test]
    async fn empty_retrieval_skips_generation() {
        let generator = Arc::new(StubGenerator::answering("unused"));
        let extractor = GroundedExtractor::new(
            Arc::new(StubRetrieval {
                passages: vec![],
                fail: false,
            }),
            Arc::clone(&generator) as Arc<dyn StructuredGenerator>,
        );
        let result = extractor
            .extract_document(&doc(), &categories(), "claude-4-sonnet", 3)
            .await;
        assert_eq!(result.answers["payment_terms"], AnswerValue::NotFound);
        assert_eq!(result.passage_counts["payment_terms"], 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retrieval_failure_becomes_error_answer() {
        let extractor = GroundedExtractor::new(
            Arc::new(StubRetrieval {
                passages: vec![],
                fail: true,
            }),
            Arc::new(StubGenerator::answering("unused")),
        );
        let result = extractor
            .extract_document(&doc(), &categories(), "claude-4-sonnet", 3)
            .await;
        match &result.answers["payment_terms"] {
            AnswerValue::Error(message) => assert!(message.contains("index offline")),
            other => panic!("expected error answer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generation_failure_becomes_error_answer() {
        let extractor = GroundedExtractor::new(
            Arc::new(StubRetrieval {
                passages: passages(2),
                fail: false,
            }),
            Arc::new(StubGenerator::failing()),
        );
        let result = extractor
            .extract_document(&doc(), &categories(), "claude-4-sonnet", 3)
            .await;
        assert!(matches!(
            result.answers["payment_terms"],
            AnswerValue::Error(_)
        ));
        // Passages were retrieved even though generation failed.
        assert_eq!(result.passage_counts["payment_terms"], 2);
    }

    #[tokio::test]
    async fn blank_generated_answer_is_not_found() {
        let extractor = GroundedExtractor::new(
            Arc::new(StubRetrieval {
                passages: passages(1),
                fail: false,
            }),
            Arc::new(StubGenerator::answering("   ")),
        );
        let result = extractor
            .extract_document(&doc(), &categories(), "claude-4-sonnet", 3)
            .await;
        assert_eq!(result.answers["payment_terms"], AnswerValue::NotFound);
    }

    #[test]
    fn prompt_labels_passages_and_caps_answer() {
        let prompt = grounded_prompt(&passages(2), "What are the payment terms?");
        assert!(prompt.contains("[msa_acme.pdf]"));
        assert!(prompt.contains("excerpt 0"));
        assert!(prompt.contains("Question: What are the payment terms?"));
        assert!(prompt.contains("under 100 words"));
        assert!(prompt.contains("Not specified"));
    }
}
