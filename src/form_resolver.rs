//! Form reference resolution.
//!
//! Procedure text names its associated forms inline, e.g.
//! `"record results on FM-105 Supplier Evaluation Form"`. The resolver
//! scans retrieved chunks for such references and emits one annotated
//! copy of the chunk per reference found. Chunks with no references
//! pass through unannotated, so downstream synthesis always sees the
//! full retrieved context.

use regex::Regex;

use crate::models::{FormRef, RetrievedChunk};

/// Seam between the query router and the reference scanner.
pub trait ResolveFormReferences: Send + Sync {
    /// Scan free text (a question or a chunk) for form references.
    fn scan(&self, text: &str) -> Vec<FormRef>;

    /// Annotate retrieved chunks with the references found in their text.
    fn resolve(&self, chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk>;
}

pub struct FormReferenceResolver {
    reference: Regex,
}

impl FormReferenceResolver {
    pub fn new() -> Self {
        Self {
            // Code + number, optional separator, then a short label that
            // stops at sentence or table boundaries.
            reference: Regex::new(r"(?i)\bFM[-\s]?(\d{2,5})\b[:\-]?\s*([^\n|.]{5,100})?")
                .expect("static regex"),
        }
    }

    /// Scan one text for form references.
    pub fn extract_form_references(&self, text: &str) -> Vec<FormRef> {
        let mut refs = Vec::new();
        for caps in self.reference.captures_iter(text) {
            let doc_number = caps[1].to_string();
            let label = caps
                .get(2)
                .map(|m| m.as_str().trim().trim_end_matches(',').trim().to_string())
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| format!("FM-{}", doc_number));

            let form_ref = FormRef {
                doc_code: "FM".to_string(),
                doc_number,
                label,
            };
            if !refs.contains(&form_ref) {
                refs.push(form_ref);
            }
        }
        refs
    }
}

impl Default for FormReferenceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolveFormReferences for FormReferenceResolver {
    fn scan(&self, text: &str) -> Vec<FormRef> {
        self.extract_form_references(text)
    }

    fn resolve(&self, chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
        let mut out = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let refs = self.extract_form_references(&chunk.text);
            if refs.is_empty() {
                out.push(chunk);
                continue;
            }
            for form_ref in refs {
                let mut annotated = chunk.clone();
                annotated.form_ref = Some(form_ref);
                out.push(annotated);
            }
        }
        out
    }
}
