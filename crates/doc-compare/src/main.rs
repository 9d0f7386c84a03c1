mod bulk;
mod compare;
mod config;
mod error;
mod evaluate;
mod extract;
mod model;
mod server;
mod validate;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tracing::info;
use tracing_subscriber::EnvFilter;

use compare_common::embedding::QueryEmbedder;
use compare_common::generate::LlmGenerator;
use compare_common::llm::{LlmClient, LlmClientConfig};
use compare_common::retrieval::{LanceChunkStore, LanceRetriever};
use compare_common::vectorstore::VectorStore;

use bulk::LlmBulkExtractor;
use config::Settings;
use server::DocCompareServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing to stderr (stdout is reserved for MCP JSON-RPC)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting doc-compare MCP server");

    let settings = Settings::from_env()?;
    info!(lancedb_path = %settings.lancedb_path, "settings loaded");

    let llm_config = LlmClientConfig::from_env();
    info!(
        base_url = %llm_config.base_url,
        timeout_ms = llm_config.default_timeout.as_millis(),
        max_retries = llm_config.max_retries,
        "llm client configured"
    );
    let llm = Arc::new(LlmClient::new(llm_config)?);
    let generator = Arc::new(LlmGenerator::new(llm));

    info!("initializing embedding model (may download on first run)");
    let embedder = Arc::new(QueryEmbedder::new().await?);
    info!("embedding model ready");

    let store = Arc::new(VectorStore::connect(&settings.lancedb_path).await?);
    info!("lancedb connected");

    let retrieval = Arc::new(LanceRetriever::new(Arc::clone(&embedder), Arc::clone(&store)));
    let chunk_store = Arc::new(LanceChunkStore::new(Arc::clone(&store)));
    let bulk_adapter = Arc::new(LlmBulkExtractor::new(
        Arc::clone(&chunk_store) as Arc<dyn compare_common::retrieval::ChunkStore>,
        Arc::clone(&generator) as Arc<dyn compare_common::generate::StructuredGenerator>,
    ));

    let server = DocCompareServer::new(retrieval, generator, chunk_store, bulk_adapter);

    info!("MCP server ready, serving on stdio");
    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!(error = %e, "MCP server error");
    })?;

    service.waiting().await?;
    info!("MCP server shut down");
    Ok(())
}
