/// Cross-document evaluation.
///
/// Given one category's per-document answers, asks the model how well the
/// dependent documents comply with the reference and returns a bounded score
/// plus rationale. Preconditions (two or more documents, an evaluation
/// question, two or more valid answers) short-circuit to a fixed zero-score
/// placeholder; a generation failure also scores zero but still counts as an
/// evaluation attempt.
use std::sync::Arc;

use compare_common::generate::{SchemaField, StructuredGenerator};
use tracing::warn;

use crate::model::{truncate_chars, AnswerValue, EvaluationResult, ValidatedDocument};

/// Explanations are truncated to this many characters.
pub const MAX_EXPLANATION_LEN: usize = 400;

const SCORE_FIELD: &str = "evaluation_score";
const EXPLANATION_FIELD: &str = "evaluation_explanation";

pub struct CrossDocEvaluator {
    generator: Arc<dyn StructuredGenerator>,
}

impl CrossDocEvaluator {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self { generator }
    }

    /// Evaluate one category. `answers` is parallel to `documents`, in the
    /// caller-supplied file order (reference document first by convention).
    pub async fn evaluate(
        &self,
        evaluation_question: Option<&str>,
        documents: &[ValidatedDocument],
        answers: &[AnswerValue],
        model: &str,
    ) -> EvaluationResult {
        debug_assert_eq!(documents.len(), answers.len());

        if documents.len() < 2 {
            return placeholder("single-file analysis - no evaluation performed");
        }
        let Some(question) = evaluation_question else {
            return placeholder("No evaluation question configured for this category");
        };
        let valid_count = answers.iter().filter(|a| a.is_valid()).count();
        if valid_count < 2 {
            return placeholder("Insufficient valid data for evaluation");
        }

        let prompt = evaluation_prompt(question, documents, answers);
        let schema = [
            SchemaField::number(SCORE_FIELD),
            SchemaField::text(EXPLANATION_FIELD),
        ];

        match self.generator.generate(model, &prompt, &schema).await {
            Ok(record) => {
                let score = record
                    .get(SCORE_FIELD)
                    .and_then(|v| v.as_number())
                    .unwrap_or(0.0)
                    .clamp(0.0, 1.0);
                let explanation = record
                    .get(EXPLANATION_FIELD)
                    .and_then(|v| v.as_text())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| truncate_chars(s, MAX_EXPLANATION_LEN))
                    .unwrap_or_else(|| "No explanation provided".to_string());
                EvaluationResult {
                    score,
                    explanation,
                    evaluated: true,
                }
            }
            Err(e) => {
                warn!(error = %e, "evaluation generation failed");
                EvaluationResult {
                    score: 0.0,
                    explanation: format!(
                        "Error in evaluation: {}",
                        truncate_chars(&e.to_string(), 100)
                    ),
                    evaluated: true,
                }
            }
        }
    }
}

fn placeholder(explanation: &str) -> EvaluationResult {
    EvaluationResult {
        score: 0.0,
        explanation: explanation.to_string(),
        evaluated: false,
    }
}

/// Build the evaluation prompt: the per-file answer block in input order,
/// the evaluation question, and the scoring bands.
fn evaluation_prompt(
    question: &str,
    documents: &[ValidatedDocument],
    answers: &[AnswerValue],
) -> String {
    let mut block = String::new();
    for (document, answer) in documents.iter().zip(answers) {
        block.push_str(&format!(
            "{} ({}): {}\n",
            document.file_name,
            document.file_type,
            answer.render()
        ));
    }

    format!(
        "Extracted answers per document:\n{block}\n\
         Evaluation question: {question}\n\n\
         Score how well the dependent document complies with the reference document on a \
         0.0-1.0 scale:\n\
         - 1.0: fully compliant\n\
         - 0.8-0.9: compliant with minor gaps\n\
         - 0.6-0.7: notable issues\n\
         - 0.4-0.5: significant gaps\n\
         - 0.0-0.3: major non-compliance\n\n\
         Give a rationale in under 100 words."
    )
}
