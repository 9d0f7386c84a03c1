/// MCP server surface for the comparison engine.
///
/// Exposes three tools:
/// - `compare_documents`: run a cross-document extraction + evaluation pass
/// - `validate_config`: check a comparison configuration without running it
/// - `list_models`: the supported model catalog with recommendations
use std::sync::Arc;

use indexmap::IndexMap;
use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use compare_common::generate::StructuredGenerator;
use compare_common::retrieval::{ChunkStore, RetrievalAdapter};

use crate::bulk::{BulkExtractionAdapter, BulkExtractor};
use crate::compare::ComparisonEngine;
use crate::config::{
    self, CompareConfig, ExtractionMode, DEFAULT_MODEL, SUPPORTED_MODELS,
};
use crate::extract::{AnswerExtraction, GroundedExtractor};
use crate::model::ComparisonResult;
use crate::validate::validate_files;

#[derive(Clone)]
pub struct DocCompareServer {
    retrieval: Arc<dyn RetrievalAdapter>,
    generator: Arc<dyn StructuredGenerator>,
    chunk_store: Arc<dyn ChunkStore>,
    bulk_adapter: Arc<dyn BulkExtractionAdapter>,
    tool_router: ToolRouter<DocCompareServer>,
}

impl DocCompareServer {
    pub fn new(
        retrieval: Arc<dyn RetrievalAdapter>,
        generator: Arc<dyn StructuredGenerator>,
        chunk_store: Arc<dyn ChunkStore>,
        bulk_adapter: Arc<dyn BulkExtractionAdapter>,
    ) -> Self {
        Self {
            retrieval,
            generator,
            chunk_store,
            bulk_adapter,
            tool_router: Self::tool_router(),
        }
    }

    fn strategy(&self, mode: ExtractionMode) -> Arc<dyn AnswerExtraction> {
        match mode {
            ExtractionMode::Grounded => Arc::new(GroundedExtractor::new(
                Arc::clone(&self.retrieval),
                Arc::clone(&self.generator),
            )),
            ExtractionMode::Bulk => {
                Arc::new(BulkExtractor::new(Arc::clone(&self.bulk_adapter)))
            }
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CompareDocumentsParams {
    /// Documents to compare: an array of `{file_name, file_type}` records.
    /// Validated server-side; the reference document goes first.
    files: serde_json::Value,
    config: CompareConfig,
    /// Model ID; defaults to the catalog default.
    model: Option<String>,
    /// Extraction strategy; defaults to grounded per-category retrieval.
    #[serde(default)]
    mode: ExtractionMode,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ValidateConfigParams {
    /// A candidate comparison configuration, as raw JSON.
    config: serde_json::Value,
}

#[derive(Debug, Serialize, JsonSchema)]
struct ConfigValidationResponse {
    is_valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
struct ModelCatalogResponse {
    supported_models: Vec<String>,
    default_model: String,
    recommended_models: IndexMap<String, String>,
}

#[tool_router]
impl DocCompareServer {
    #[tool(description = "Compare clauses across contract documents. Extracts an answer per \
category per document, scores cross-document compliance, and returns per-category results plus \
a summary.")]
    async fn compare_documents(
        &self,
        Parameters(params): Parameters<CompareDocumentsParams>,
    ) -> Result<Json<ComparisonResult>, String> {
        let warnings = params.config.validate().map_err(|e| e.to_string())?;
        for warning in &warnings {
            warn!(warning, "comparison config warning");
        }

        let model = params
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODEL)
            .to_string();
        if !SUPPORTED_MODELS.contains(&model.as_str()) {
            warn!(model, "model not in supported catalog, proceeding anyway");
        }

        let documents = validate_files(&params.files, self.chunk_store.as_ref())
            .await
            .map_err(|e| e.to_string())?;

        let engine = ComparisonEngine::new(
            self.strategy(params.mode),
            Arc::clone(&self.generator),
        );
        let result = engine.run(&documents, &params.config, &model).await;
        Ok(Json(result))
    }

    #[tool(description = "Validate a comparison configuration (extraction_config, \
evaluation_config, search_limit) without running a comparison. Returns errors and warnings.")]
    async fn validate_config(
        &self,
        Parameters(params): Parameters<ValidateConfigParams>,
    ) -> Result<Json<ConfigValidationResponse>, String> {
        let config: CompareConfig = match serde_json::from_value(params.config) {
            Ok(config) => config,
            Err(e) => {
                return Ok(Json(ConfigValidationResponse {
                    is_valid: false,
                    errors: vec![format!("malformed configuration: {e}")],
                    warnings: vec![],
                }));
            }
        };
        let response = match config.validate() {
            Ok(warnings) => ConfigValidationResponse {
                is_valid: true,
                errors: vec![],
                warnings,
            },
            Err(e) => ConfigValidationResponse {
                is_valid: false,
                errors: vec![e.to_string()],
                warnings: vec![],
            },
        };
        Ok(Json(response))
    }

    #[tool(description = "List supported model IDs, the default model, and per-use-case \
recommendations (quality/balanced/speed).")]
    async fn list_models(&self) -> Result<Json<ModelCatalogResponse>, String> {
        info!("model catalog requested");
        Ok(Json(ModelCatalogResponse {
            supported_models: SUPPORTED_MODELS.iter().map(|m| m.to_string()).collect(),
            default_model: DEFAULT_MODEL.to_string(),
            recommended_models: config::recommended_models(),
        }))
    }
}

#[tool_handler]
impl ServerHandler for DocCompareServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "doc-compare".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Cross-document contract comparison MCP server. Use compare_documents to \
                 extract and score clauses (payment terms, notice periods, confidentiality, \
                 etc.) across a reference document and dependent documents, validate_config \
                 to check a category configuration, and list_models to discover supported \
                 model IDs."
                    .to_string(),
            ),
        }
    }
}
