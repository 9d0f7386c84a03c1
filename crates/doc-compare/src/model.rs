use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A document picked for comparison, as supplied by the caller.
///
/// `file_name` may carry a stage/path prefix (e.g. "@MSA_STAGE/2024/msa.pdf");
/// `file_type` selects the chunk table and search service for the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentRef {
    pub file_name: String,
    pub file_type: String,
}

/// A `DocumentRef` that passed validation, with the derived names the engine
/// uses downstream. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDocument {
    pub file_name: String,
    /// Normalized to uppercase.
    pub file_type: String,
    /// `{FILE_TYPE}_CHUNKS`
    pub chunk_table: String,
    /// `{FILE_TYPE}_SEARCH_SERVICE`
    pub search_service: String,
    /// Last path segment of `file_name`; the exact key stored chunks are
    /// filtered on.
    pub base_name: String,
}

impl ValidatedDocument {
    pub fn as_ref(&self) -> DocumentRef {
        DocumentRef {
            file_name: self.file_name.clone(),
            file_type: self.file_type.clone(),
        }
    }
}

/// Strip any stage/path prefix from a file name by splitting on the last path
/// separator. Retrieval filtering depends on an exact match against the
/// stored base file name, so this rule must hold exactly.
pub fn base_file_name(file_name: &str) -> &str {
    file_name.rsplit('/').next().unwrap_or(file_name)
}

/// One document's answer to one extraction question.
///
/// Typed internally; the reserved sentinel strings appear only when rendered
/// at the serialization boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    Found(String),
    NotFound,
    NotSpecified,
    Error(String),
}

impl AnswerValue {
    /// Only `Found` answers count as valid for match counting and as
    /// evaluation input.
    pub fn is_valid(&self) -> bool {
        matches!(self, AnswerValue::Found(_))
    }

    /// Render to the external sentinel contract.
    pub fn render(&self) -> String {
        match self {
            AnswerValue::Found(text) => text.clone(),
            AnswerValue::NotFound => "Not found in document".to_string(),
            AnswerValue::NotSpecified => "Not specified".to_string(),
            AnswerValue::Error(message) => format!("Error: {message}"),
        }
    }

    /// Classify raw model output. Blank output and the known "absent"
    /// phrasings collapse into the typed sentinels.
    pub fn from_model_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return AnswerValue::NotFound;
        }
        let lowered = trimmed.to_lowercase();
        let bare = lowered.trim_end_matches(['.', '!']);
        match bare {
            "not found" | "not found in document" | "not found in the document" => {
                AnswerValue::NotFound
            }
            "not specified" | "n/a" | "none specified" => AnswerValue::NotSpecified,
            _ => AnswerValue::Found(trimmed.to_string()),
        }
    }
}

/// Compliance score and rationale for one category.
///
/// `score` is always within [0.0, 1.0] and `explanation` never exceeds 400
/// characters. `evaluated` is false for precondition short-circuits
/// (placeholders) and true whenever a generation call was actually attempted,
/// including attempts that failed; only evaluated results enter the average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EvaluationResult {
    pub score: f64,
    pub explanation: String,
    pub evaluated: bool,
}

/// Everything recorded for one category of the comparison.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CategoryResult {
    /// The extraction question that was asked of every document.
    pub question: String,
    /// file name -> rendered answer (or sentinel).
    pub answers: IndexMap<String, String>,
    pub evaluation: EvaluationResult,
    /// file name -> passages used for grounding (presence flag in bulk mode).
    pub passage_counts: IndexMap<String, usize>,
}

/// Aggregate statistics across all categories.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Summary {
    pub total_categories: usize,
    /// file name -> number of categories with a valid (non-sentinel) answer.
    pub match_count_per_file: IndexMap<String, usize>,
    /// Categories scoring >= 0.8.
    pub high_compliance_count: usize,
    /// Mean score over evaluated categories; 0.0 when none were evaluated.
    pub average_score: f64,
}

/// The full result of one comparison invocation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ComparisonResult {
    pub files: Vec<DocumentRef>,
    pub model: String,
    pub extraction_method: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub categories: IndexMap<String, CategoryResult>,
    pub summary: Summary,
}

/// Truncate to at most `max` characters, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_stage_prefix() {
        assert_eq!(base_file_name("@MSA_STAGE/2024/msa_acme.pdf"), "msa_acme.pdf");
        assert_eq!(base_file_name("plain.pdf"), "plain.pdf");
        assert_eq!(base_file_name("a/b/c.pdf"), "c.pdf");
    }

    #[test]
    fn blank_model_output_is_not_found() {
        assert_eq!(AnswerValue::from_model_text("   "), AnswerValue::NotFound);
        assert_eq!(AnswerValue::from_model_text(""), AnswerValue::NotFound);
    }

    #[test]
    fn sentinel_phrases_are_classified() {
        assert_eq!(
            AnswerValue::from_model_text("Not found in document."),
            AnswerValue::NotFound
        );
        assert_eq!(
            AnswerValue::from_model_text("NOT SPECIFIED"),
            AnswerValue::NotSpecified
        );
        assert_eq!(AnswerValue::from_model_text("N/A"), AnswerValue::NotSpecified);
    }

    #[test]
    fn real_answers_survive_classification() {
        let answer = AnswerValue::from_model_text("  Net 45 days from invoice  ");
        assert_eq!(answer, AnswerValue::Found("Net 45 days from invoice".to_string()));
        assert!(answer.is_valid());
    }

    #[test]
    fn sentinels_are_not_valid() {
        assert!(!AnswerValue::NotFound.is_valid());
        assert!(!AnswerValue::NotSpecified.is_valid());
        assert!(!AnswerValue::Error("boom".to_string()).is_valid());
    }

    #[test]
    fn render_matches_external_contract() {
        assert_eq!(AnswerValue::NotFound.render(), "Not found in document");
        assert_eq!(AnswerValue::NotSpecified.render(), "Not specified");
        assert_eq!(
            AnswerValue::Error("timeout".to_string()).render(),
            "Error: timeout"
        );
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 400), "short");
    }
}
