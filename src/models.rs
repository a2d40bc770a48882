//! Core data models used throughout Audit Harness.
//!
//! These types represent the documents, pages, chunks, and retrieval results
//! that flow through the ingestion and question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file listed by a source connector before download.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub modified_time: DateTime<Utc>,
}

/// A raw compliance document at ingestion start.
///
/// Created once per source file and discarded after its chunks are
/// produced. Never mutated.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub organization: String,
    pub doc_type: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// One page of OCR output. Pages are ordered and 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub page_number: u32,
    pub text: String,
}

/// Identity fields parsed from a document's filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocIdentity {
    pub doc_code: String,
    pub doc_number: String,
    pub doc_version: String,
    pub title: String,
}

/// Metadata persisted alongside every vector.
///
/// The chunk text is carried here because the vector store returns
/// metadata, not raw embeddings; answer synthesis and citations depend
/// on it being present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub text: String,
    pub document_id: String,
    pub organization: String,
    pub doc_type: String,
    pub doc_code: String,
    pub doc_number: String,
    pub doc_version: String,
    pub title: String,
    pub file_name: String,
    pub page: u32,
    pub chunk_index: usize,
}

/// A retrievable unit of document text, prior to embedding.
///
/// The id is derived deterministically from (document, page, chunk index)
/// so re-ingestion overwrites rather than duplicates.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(metadata: ChunkMetadata) -> Self {
        let id = chunk_id(&metadata.document_id, metadata.page, metadata.chunk_index);
        Self { id, metadata }
    }
}

/// Deterministic chunk id: same document, page, and index always map to
/// the same vector record.
pub fn chunk_id(document_id: &str, page: u32, chunk_index: usize) -> String {
    format!("{}-p{}-c{}", document_id, page, chunk_index)
}

/// The persisted form of a chunk: id, embedding, and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A single match returned by a vector store query.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// A form reference discovered inside procedure text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRef {
    /// Normalized form code, e.g. `"FM"`.
    pub doc_code: String,
    /// Form number, e.g. `"105"`.
    pub doc_number: String,
    /// Short label following the code in the text.
    pub label: String,
}

impl FormRef {
    /// Display form, e.g. `"FM-105: Supplier Evaluation Form"`.
    pub fn display(&self) -> String {
        format!("{}-{}: {}", self.doc_code, self.doc_number, self.label)
    }
}

/// A chunk handed to the answer synthesizer, optionally annotated with a
/// form reference discovered in its text.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub form_ref: Option<FormRef>,
}

impl RetrievedChunk {
    pub fn from_match(m: QueryMatch) -> Self {
        Self {
            text: m.metadata.text.clone(),
            metadata: m.metadata,
            form_ref: None,
        }
    }
}

/// Citation attached to a synthesized answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub title: String,
    pub file_name: String,
    pub page: u32,
}

/// Structured answer to an audit question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub found_in_context: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation: Option<Citation>,
}

impl AnswerResult {
    /// The fixed template returned when no supporting chunks exist.
    pub fn not_in_context(doc_type_label: &str) -> Self {
        Self {
            answer: format!("The {} does not contain this information.", doc_type_label),
            found_in_context: false,
            citation: None,
        }
    }
}

/// Compute the namespace key for an organization and document type.
///
/// Format is compatibility critical:
/// `{lower(org, spaces→dashes)}__{lower(docType, spaces→dashes)}`.
///
/// # Example
///
/// ```rust
/// use audit_harness::models::namespace;
///
/// assert_eq!(namespace("Acme Corp", "Quality Manuals"), "acme-corp__quality-manuals");
/// ```
pub fn namespace(organization: &str, doc_type: &str) -> String {
    format!("{}__{}", slugify(organization), slugify(doc_type))
}

fn slugify(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}
