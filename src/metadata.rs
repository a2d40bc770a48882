//! Filename metadata extraction.
//!
//! Compliance filenames encode the document's identity, e.g.
//! `"FM-105 Supplier Evaluation-REV2.pdf"` → code `FM`, number `105`,
//! version `REV 2`, title `Supplier Evaluation`.
//!
//! Extraction is an ordered list of rules over the normalized base name:
//!
//! 1. Form code (`FM` + 2–5 digits) — outranks every other code token.
//! 2. Manual/procedure code (`QM`/`SP`/`SOP` + 2–5 digits).
//! 3. Revision (`REV` + 1–3 digits) → `"REV <n>"`, empty when absent.
//! 4. Title: the span after the document number, up to a revision marker
//!    or parenthetical, with `_`/`-` separators normalized to spaces.
//!
//! Unmatched fields default to `"unknown"` (codes and numbers) or
//! `"Untitled"` (title). Pure and side-effect free.

use regex::Regex;

use crate::models::DocIdentity;

pub struct MetadataExtractor {
    extension: Regex,
    form: Regex,
    doc: Regex,
    revision: Regex,
    title: Regex,
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self {
            extension: Regex::new(r"(?i)\.(docx|pdf|txt|md)$").expect("static regex"),
            form: Regex::new(r"(?i)\bFM[-\s]?(\d{2,5})\b").expect("static regex"),
            doc: Regex::new(r"(?i)\b(QM|SP|SOP)[-\s]?(\d{2,5})\b").expect("static regex"),
            revision: Regex::new(r"(?i)\bREV[-\s]?(\d{1,3})\b").expect("static regex"),
            title: Regex::new(r"(?i)\d{2,5}[-\s]+(.*?)(?:-\s*REV|\(|$)").expect("static regex"),
        }
    }

    /// Parse identity fields out of a filename.
    pub fn extract(&self, file_name: &str) -> DocIdentity {
        // Underscores count as word characters and would defeat the \b
        // anchors, so they are normalized to spaces up front.
        let base = self
            .extension
            .replace(file_name, "")
            .replace('_', " ");

        let form_capture = self.form.captures(&base);
        let doc_capture = self.doc.captures(&base);

        // A form token outranks manual/procedure tokens.
        let (doc_code, doc_number) = if let Some(c) = &form_capture {
            ("FM".to_string(), c[1].to_string())
        } else if let Some(c) = &doc_capture {
            (c[1].to_uppercase(), c[2].to_string())
        } else {
            ("unknown".to_string(), "unknown".to_string())
        };

        let doc_version = self
            .revision
            .captures(&base)
            .map(|c| format!("REV {}", &c[1]))
            .unwrap_or_default();

        let title = self
            .title
            .captures(&base)
            .map(|c| normalize_title(&c[1]))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        DocIdentity {
            doc_code,
            doc_number,
            doc_version,
            title,
        }
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_title(raw: &str) -> String {
    raw.replace('-', " ").trim().to_string()
}
