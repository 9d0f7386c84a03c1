/// Comparison orchestrator.
///
/// Drives the selected extraction strategy and the cross-document evaluator
/// across every category of the request, in category insertion order, and
/// aggregates per-file and overall statistics. Failure isolation is the
/// organizing principle: one document or one category going wrong degrades
/// that slice of the result and nothing else. Only validation and config
/// errors (handled before `run` is called) abort a request.
use std::sync::Arc;

use compare_common::generate::StructuredGenerator;
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::config::CompareConfig;
use crate::evaluate::CrossDocEvaluator;
use crate::extract::{AnswerExtraction, DocumentAnswers};
use crate::model::{
    AnswerValue, CategoryResult, ComparisonResult, Summary, ValidatedDocument,
};

/// Categories scoring at or above this count as high compliance.
const HIGH_COMPLIANCE_THRESHOLD: f64 = 0.8;

pub struct ComparisonEngine {
    strategy: Arc<dyn AnswerExtraction>,
    evaluator: CrossDocEvaluator,
}

impl ComparisonEngine {
    pub fn new(
        strategy: Arc<dyn AnswerExtraction>,
        generator: Arc<dyn StructuredGenerator>,
    ) -> Self {
        Self {
            strategy,
            evaluator: CrossDocEvaluator::new(generator),
        }
    }

    /// Run one comparison over validated documents. Always produces a
    /// `ComparisonResult` covering every requested category.
    pub async fn run(
        &self,
        documents: &[ValidatedDocument],
        config: &CompareConfig,
        model: &str,
    ) -> ComparisonResult {
        info!(
            files = documents.len(),
            categories = config.extraction_config.len(),
            model,
            method = self.strategy.method_name(),
            "comparison started"
        );

        // Phase 1: gather every document's answers with the selected
        // strategy. Per-(document, category) failures are already data here.
        let mut per_document: Vec<DocumentAnswers> = Vec::with_capacity(documents.len());
        for document in documents {
            let answers = self
                .strategy
                .extract_document(
                    document,
                    &config.extraction_config,
                    model,
                    config.search_limit,
                )
                .await;
            per_document.push(answers);
        }

        // Phase 2: per category, record answers, evaluate, aggregate.
        let mut match_count_per_file: IndexMap<String, usize> = documents
            .iter()
            .map(|d| (d.file_name.clone(), 0))
            .collect();
        let mut categories: IndexMap<String, CategoryResult> = IndexMap::new();
        let mut score_sum = 0.0;
        let mut evaluation_count = 0usize;
        let mut high_compliance_count = 0usize;

        for (category, question) in &config.extraction_config {
            let typed_answers: Vec<AnswerValue> = per_document
                .iter()
                .map(|doc_answers| {
                    doc_answers.answers.get(category).cloned().unwrap_or_else(|| {
                        // Strategies fill every category; a hole here is an
                        // internal fault, isolated to this pair.
                        warn!(category, "extraction output missing category");
                        AnswerValue::Error("no extraction result for category".to_string())
                    })
                })
                .collect();

            for (document, answer) in documents.iter().zip(&typed_answers) {
                if answer.is_valid() {
                    if let Some(count) = match_count_per_file.get_mut(&document.file_name) {
                        *count += 1;
                    }
                }
            }

            let evaluation = self
                .evaluator
                .evaluate(
                    config.evaluation_config.get(category).map(String::as_str),
                    documents,
                    &typed_answers,
                    model,
                )
                .await;

            if evaluation.evaluated {
                score_sum += evaluation.score;
                evaluation_count += 1;
            }
            if evaluation.score >= HIGH_COMPLIANCE_THRESHOLD {
                high_compliance_count += 1;
            }

            let answers: IndexMap<String, String> = documents
                .iter()
                .zip(&typed_answers)
                .map(|(document, answer)| (document.file_name.clone(), answer.render()))
                .collect();
            let passage_counts: IndexMap<String, usize> = documents
                .iter()
                .zip(&per_document)
                .map(|(document, doc_answers)| {
                    let count = doc_answers.passage_counts.get(category).copied().unwrap_or(0);
                    (document.file_name.clone(), count)
                })
                .collect();

            categories.insert(
                category.clone(),
                CategoryResult {
                    question: question.clone(),
                    answers,
                    evaluation,
                    passage_counts,
                },
            );
        }

        let average_score = if evaluation_count > 0 {
            score_sum / evaluation_count as f64
        } else {
            0.0
        };

        info!(
            categories = categories.len(),
            evaluated = evaluation_count,
            average_score,
            "comparison finished"
        );

        ComparisonResult {
            files: documents.iter().map(ValidatedDocument::as_ref).collect(),
            model: model.to_string(),
            extraction_method: self.strategy.method_name().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            categories,
            summary: Summary {
                total_categories: config.extraction_config.len(),
                match_count_per_file,
                high_compliance_count,
                average_score,
            },
        }
    }
}
