//! Error taxonomy for the ingestion and question-answering pipeline.
//!
//! Each variant maps to a distinct failure policy:
//!
//! | Variant | Policy |
//! |---------|--------|
//! | [`Configuration`](PipelineError::Configuration) | Fatal, no retry |
//! | [`SourceFetch`](PipelineError::SourceFetch) | Per-file, skip and continue |
//! | [`Ocr`](PipelineError::Ocr) | Per-file, skip and continue |
//! | [`Embedding`](PipelineError::Embedding) | Retry once, then abort the current document only |
//! | [`Index`](PipelineError::Index) | Retry once, then mark document failed; batch continues |
//! | [`Retrieval`](PipelineError::Retrieval) | Surfaced distinctly from zero matches |
//! | [`Synthesis`](PipelineError::Synthesis) | Falls back to the safe empty-context template |
//!
//! Per-document ingestion failures never abort the batch; per-question
//! failures never mutate index state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to fetch '{file}': {reason}")]
    SourceFetch { file: String, reason: String },

    #[error("OCR failed for '{file}': {reason}")]
    Ocr { file: String, reason: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("index upsert failed: {0}")]
    Index(String),

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("answer synthesis failed: {0}")]
    Synthesis(String),
}

impl PipelineError {
    /// Short category tag used in ingestion reports.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::SourceFetch { .. } => "source-fetch",
            PipelineError::Ocr { .. } => "ocr",
            PipelineError::Embedding(_) => "embedding",
            PipelineError::Index(_) => "index",
            PipelineError::Retrieval(_) => "retrieval",
            PipelineError::Synthesis(_) => "synthesis",
        }
    }
}
