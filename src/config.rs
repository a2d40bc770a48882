use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub source: SourceConfig,
    /// Ingestion targets: one namespace per (organization, doc_type) pair.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub doc_codes: DocCodesConfig,
    #[serde(default)]
    pub doc_types: DocTypesConfig,
}

/// Document type labels as they appear in target configuration and
/// namespace keys. The query router uses these to pick which namespace
/// each flow searches.
#[derive(Debug, Deserialize, Clone)]
pub struct DocTypesConfig {
    #[serde(default = "default_doc_type_quality_manual")]
    pub quality_manual: String,
    #[serde(default = "default_doc_type_procedure")]
    pub procedure: String,
    #[serde(default = "default_doc_type_form")]
    pub form: String,
}

impl Default for DocTypesConfig {
    fn default() -> Self {
        Self {
            quality_manual: default_doc_type_quality_manual(),
            procedure: default_doc_type_procedure(),
            form: default_doc_type_form(),
        }
    }
}

fn default_doc_type_quality_manual() -> String {
    "quality-manuals".to_string()
}
fn default_doc_type_procedure() -> String {
    "procedures".to_string()
}
fn default_doc_type_form() -> String {
    "forms".to_string()
}

/// One ingestion target: a source folder indexed into the namespace
/// derived from its organization and document type.
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    pub organization: String,
    pub doc_type: String,
    pub folder_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in word tokens.
    #[serde(default = "default_window_tokens")]
    pub window_tokens: usize,
    /// Tokens shared between consecutive windows.
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_tokens: default_window_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

// Chunking and threshold defaults carried over from the production index;
// their original tuning rationale is not documented, so they are kept as
// configuration rather than literals.
fn default_window_tokens() -> usize {
    512
}
fn default_overlap_tokens() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Matches with score <= threshold are dropped everywhere.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidate multiplier for the title-keyword mode, which cannot
    /// filter natively and must over-fetch.
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    /// topK for direct form fetches by code and number.
    #[serde(default = "default_form_top_k")]
    pub form_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            score_threshold: default_score_threshold(),
            top_k: default_top_k(),
            overfetch_factor: default_overfetch_factor(),
            form_top_k: default_form_top_k(),
        }
    }
}

fn default_score_threshold() -> f32 {
    0.3
}
fn default_top_k() -> usize {
    10
}
fn default_overfetch_factor() -> usize {
    3
}
fn default_form_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
// Collaborator calls are bounded by a timeout and allowed exactly one
// retry on transient failure before failing terminally.
fn default_max_retries() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    /// `"mistral"` for scanned PDFs, `"plain"` for UTF-8 text files.
    #[serde(default = "default_ocr_provider")]
    pub provider: String,
    #[serde(default = "default_ocr_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider: default_ocr_provider(),
            model: default_ocr_model(),
            max_retries: default_max_retries(),
            timeout_secs: default_ocr_timeout_secs(),
        }
    }
}

fn default_ocr_provider() -> String {
    "mistral".to_string()
}
fn default_ocr_model() -> String {
    "mistral-ocr-latest".to_string()
}
fn default_ocr_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    /// `"pinecone"` or `"memory"` (tests and dry runs).
    #[serde(default = "default_store_provider")]
    pub provider: String,
    /// Index host URL for the Pinecone provider.
    #[serde(default)]
    pub index_host: Option<String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_store_provider(),
            index_host: None,
        }
    }
}

fn default_store_provider() -> String {
    "pinecone".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// `"filesystem"` (folder_id is a directory path) or `"drive"`.
    #[serde(default = "default_source_provider")]
    pub provider: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            provider: default_source_provider(),
        }
    }
}

fn default_source_provider() -> String {
    "filesystem".to_string()
}

/// Organization-specific document code standards.
///
/// Metadata filtering keys on these codes; they differ per client
/// (e.g. procedures are `SP` at paramount, `SOP` elsewhere).
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DocCodes {
    pub quality_manual: String,
    pub procedure: String,
    pub form: String,
}

impl Default for DocCodes {
    fn default() -> Self {
        Self {
            quality_manual: "QM".to_string(),
            procedure: "SOP".to_string(),
            form: "FM".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DocCodesConfig {
    #[serde(default)]
    pub default: Option<DocCodes>,
    /// Per-organization overrides, keyed by lowercase organization name.
    #[serde(default)]
    pub overrides: HashMap<String, DocCodes>,
}

impl DocCodesConfig {
    /// Resolve the code standard for an organization.
    pub fn resolve(&self, organization: &str) -> DocCodes {
        let key = organization.to_lowercase();
        self.overrides
            .get(&key)
            .cloned()
            .or_else(|| self.default.clone())
            .unwrap_or_default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.window_tokens == 0 {
        anyhow::bail!("chunking.window_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.window_tokens {
        anyhow::bail!("chunking.overlap_tokens must be < chunking.window_tokens");
    }

    if !(0.0..=1.0).contains(&config.retrieval.score_threshold) {
        anyhow::bail!("retrieval.score_threshold must be in [0.0, 1.0]");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.overfetch_factor == 0 {
        anyhow::bail!("retrieval.overfetch_factor must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be set for the openai provider");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 for the openai provider");
            }
        }
        other => anyhow::bail!("Unknown embedding provider: '{}'. Must be openai.", other),
    }

    match config.ocr.provider.as_str() {
        "mistral" | "plain" => {}
        other => anyhow::bail!("Unknown OCR provider: '{}'. Must be mistral or plain.", other),
    }

    match config.vector_store.provider.as_str() {
        "pinecone" => {
            if config.vector_store.index_host.is_none() {
                anyhow::bail!("vector_store.index_host must be set for the pinecone provider");
            }
        }
        "memory" => {}
        other => anyhow::bail!(
            "Unknown vector store provider: '{}'. Must be pinecone or memory.",
            other
        ),
    }

    match config.source.provider.as_str() {
        "filesystem" | "drive" => {}
        other => anyhow::bail!(
            "Unknown source provider: '{}'. Must be filesystem or drive.",
            other
        ),
    }

    for target in &config.targets {
        if target.organization.trim().is_empty() || target.doc_type.trim().is_empty() {
            anyhow::bail!("targets entries must set organization and doc_type");
        }
        if target.folder_id.trim().is_empty() {
            anyhow::bail!("targets entries must set folder_id");
        }
    }

    Ok(())
}
