use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Hard cap on documents per comparison request.
pub const MAX_FILES: usize = 15;

/// Passages retrieved per question when the caller doesn't override it.
pub const DEFAULT_SEARCH_LIMIT: usize = 3;
pub const MIN_SEARCH_LIMIT: usize = 1;
pub const MAX_SEARCH_LIMIT: usize = 10;

/// Model used when the caller doesn't pick one.
pub const DEFAULT_MODEL: &str = "claude-4-sonnet";

/// Model IDs the catalog advertises.
pub const SUPPORTED_MODELS: &[&str] = &[
    "claude-4-sonnet",
    "claude-3-5-sonnet",
    "claude-3-7-sonnet",
    "llama3-8b",
    "mixtral-8x7b",
    "snowflake-llama-3.1-405b",
];

/// Recommended model per use case, surfaced by the `list_models` tool.
pub fn recommended_models() -> IndexMap<String, String> {
    IndexMap::from([
        ("quality".to_string(), "claude-4-sonnet".to_string()),
        ("balanced".to_string(), "mixtral-8x7b".to_string()),
        ("speed".to_string(), "llama3-8b".to_string()),
    ])
}

/// Chunk table name for a (normalized, uppercase) file type.
pub fn chunk_table(file_type: &str) -> String {
    format!("{}_CHUNKS", file_type.to_uppercase())
}

/// Search service name for a (normalized, uppercase) file type.
pub fn search_service(file_type: &str) -> String {
    format!("{}_SEARCH_SERVICE", file_type.to_uppercase())
}

/// Which extraction strategy a comparison request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// One retrieval + generation round trip per category per document.
    #[default]
    Grounded,
    /// One whole-document structured call per document covering every category.
    Bulk,
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

/// Per-request comparison configuration.
///
/// `extraction_config` maps category name -> extraction question and drives
/// iteration order (insertion order, not sorted). `evaluation_config` maps
/// category name -> evaluation question; categories absent there get no
/// cross-document evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompareConfig {
    pub extraction_config: IndexMap<String, String>,
    #[serde(default)]
    pub evaluation_config: IndexMap<String, String>,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl CompareConfig {
    /// Validate the configuration. Returns non-fatal warnings on success.
    ///
    /// Rejections: empty `extraction_config`, `search_limit` outside
    /// [1, 10]. Key-set mismatches between extraction and evaluation configs
    /// only warn, matching the configuration surface's contract.
    pub fn validate(&self) -> Result<Vec<String>, AppError> {
        if self.extraction_config.is_empty() {
            return Err(AppError::Config(
                "extraction_config must contain at least one category".to_string(),
            ));
        }
        if self.search_limit < MIN_SEARCH_LIMIT || self.search_limit > MAX_SEARCH_LIMIT {
            return Err(AppError::Config(format!(
                "search_limit must be between {MIN_SEARCH_LIMIT} and {MAX_SEARCH_LIMIT}, got {}",
                self.search_limit
            )));
        }

        let mut warnings = Vec::new();
        for category in self.evaluation_config.keys() {
            if !self.extraction_config.contains_key(category) {
                warnings.push(format!(
                    "evaluation_config key '{category}' has no matching extraction question"
                ));
            }
        }
        for category in self.extraction_config.keys() {
            if !self.evaluation_config.is_empty() && !self.evaluation_config.contains_key(category)
            {
                warnings.push(format!(
                    "category '{category}' has no evaluation question and will not be scored"
                ));
            }
        }
        Ok(warnings)
    }
}

/// Process-level settings, loaded explicitly from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Filesystem path to the LanceDB data directory holding the chunk tables.
    pub lancedb_path: String,
}

impl Settings {
    /// Required: `LANCEDB_PATH`. The LLM client reads its own `LLM_*`
    /// variables separately.
    pub fn from_env() -> Result<Self, AppError> {
        let lancedb_path = std::env::var("LANCEDB_PATH").map_err(|_| {
            AppError::Config("LANCEDB_PATH environment variable is required".to_string())
        })?;
        Ok(Self { lancedb_path })
    }
}
