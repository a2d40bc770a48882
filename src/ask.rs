//! Provider wiring and the question-answering entry point.
//!
//! Everything here turns configuration into concrete collaborators and
//! hands them to the pipeline. Provider selection failures are
//! configuration errors and fail fast before any network call.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::connector::SourceConnector;
use crate::connector_drive::DriveConnector;
use crate::connector_fs::FilesystemConnector;
use crate::embedding::{EmbeddingProvider, OpenAiEmbedder};
use crate::form_resolver::FormReferenceResolver;
use crate::ocr::{MistralOcr, OcrEngine, PlainTextOcr};
use crate::retriever::Retriever;
use crate::router::{QueryRouter, RouteOutcome};
use crate::synthesizer::{AnswerSynthesizer, OpenAiChat};
use crate::vector_store::memory::InMemoryStore;
use crate::vector_store::{PineconeStore, VectorStore};

pub fn build_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(&config.embedding)?)),
        other => bail!("Unknown embedding provider: '{}'", other),
    }
}

pub fn build_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    match config.vector_store.provider.as_str() {
        "pinecone" => Ok(Arc::new(PineconeStore::new(
            &config.vector_store,
            config.embedding.timeout_secs,
        )?)),
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        other => bail!("Unknown vector store provider: '{}'", other),
    }
}

pub fn build_connector(config: &Config) -> Result<Box<dyn SourceConnector>> {
    match config.source.provider.as_str() {
        "filesystem" => Ok(Box::new(FilesystemConnector::new())),
        "drive" => Ok(Box::new(DriveConnector::new(config.ocr.timeout_secs)?)),
        other => bail!("Unknown source provider: '{}'", other),
    }
}

pub fn build_ocr(config: &Config) -> Result<Box<dyn OcrEngine>> {
    match config.ocr.provider.as_str() {
        "mistral" => Ok(Box::new(MistralOcr::new(&config.ocr)?)),
        "plain" => Ok(Box::new(PlainTextOcr)),
        other => bail!("Unknown OCR provider: '{}'", other),
    }
}

/// Answer one audit question for one organization.
pub async fn ask(config: &Config, question: &str, organization: &str) -> Result<RouteOutcome> {
    let embedder = build_embedder(config)?;
    let store = build_store(config)?;

    let retriever = Arc::new(Retriever::new(
        embedder,
        store,
        config.retrieval.clone(),
    ));
    let resolver = Arc::new(FormReferenceResolver::new());
    let llm = Arc::new(OpenAiChat::new(&config.llm)?);
    let synthesizer = Arc::new(AnswerSynthesizer::new(llm));

    let router = QueryRouter::new(
        retriever,
        resolver,
        synthesizer,
        config.doc_codes.clone(),
        config.doc_types.clone(),
    );

    Ok(router.route(question, organization).await?)
}
