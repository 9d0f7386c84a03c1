pub mod embedding;
pub mod error;
pub mod generate;
pub mod llm;
pub mod retrieval;
pub mod vectorstore;
