//! Source connector abstraction.
//!
//! A connector lists the files inside a configured folder and downloads
//! their raw bytes. Everything after that (OCR, metadata extraction,
//! chunking, indexing) is connector-agnostic.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::SourceFile;

/// Extensions the ingestion pipeline accepts.
const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "md"];

/// A document source that can list a folder and fetch file contents.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// List the files inside a folder.
    async fn list(&self, folder_id: &str) -> Result<Vec<SourceFile>>;

    /// Download a file's raw bytes.
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>>;
}

/// Whether a filename has an ingestable extension.
pub fn is_supported(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
