//! Sliding word-window text chunker.
//!
//! Splits page text into overlapping retrieval windows of `window` word
//! tokens, advancing by `window - overlap` tokens per step.
//!
//! # Guarantees
//!
//! - Every input token appears in at least one chunk.
//! - Consecutive chunks share exactly `overlap` tokens, except the final
//!   chunk, which may be shorter.
//! - Chunk indices are contiguous within a page: `0, 1, 2, …`.
//! - Deterministic: identical input always produces identical windows.

use crate::config::ChunkingConfig;
use crate::models::{Chunk, ChunkMetadata, DocIdentity, Document, Page};

/// Split text into overlapping windows of `window` word tokens.
///
/// Tokens are whitespace-separated words. The window advances by
/// `window - overlap` tokens each step and stops once a window would
/// start past the last token, so empty text yields no chunks.
///
/// Callers must ensure `overlap < window`; config validation enforces it.
pub fn window_text(text: &str, window: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < window, "overlap must be < window");

    let words: Vec<&str> = text.split_whitespace().collect();
    let stride = window - overlap;
    let mut chunks = Vec::new();

    let mut start = 0;
    while start < words.len() {
        let end = (start + window).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += stride;
    }

    chunks
}

/// Chunk one OCR page, attaching document-level metadata to each window.
pub fn chunk_page(
    doc: &Document,
    identity: &DocIdentity,
    page: &Page,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    window_text(&page.text, config.window_tokens, config.overlap_tokens)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| {
            Chunk::new(ChunkMetadata {
                text,
                document_id: doc.id.clone(),
                organization: doc.organization.clone(),
                doc_type: doc.doc_type.clone(),
                doc_code: identity.doc_code.clone(),
                doc_number: identity.doc_number.clone(),
                doc_version: identity.doc_version.clone(),
                title: identity.title.clone(),
                file_name: doc.file_name.clone(),
                page: page.page_number,
                chunk_index,
            })
        })
        .collect()
}
