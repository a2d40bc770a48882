//! Filesystem connector.
//!
//! Treats a target's `folder_id` as a local directory path. Used for
//! local corpora and integration tests; the directory tree is walked
//! recursively and non-document files are skipped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use walkdir::WalkDir;

use crate::connector::{is_supported, SourceConnector};
use crate::models::SourceFile;

pub struct FilesystemConnector;

impl FilesystemConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FilesystemConnector {
    fn default() -> Self {
        Self::new()
    }
}

fn mime_type_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()) {
        Some(ext) if ext == "pdf" => "application/pdf",
        Some(ext) if ext == "docx" => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some(ext) if ext == "md" => "text/markdown",
        _ => "text/plain",
    }
}

#[async_trait]
impl SourceConnector for FilesystemConnector {
    async fn list(&self, folder_id: &str) -> Result<Vec<SourceFile>> {
        let root = Path::new(folder_id);
        if !root.is_dir() {
            bail!("Source folder does not exist: {}", root.display());
        }

        let mut files = Vec::new();

        for entry in WalkDir::new(root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if !is_supported(&name) {
                continue;
            }

            let modified = entry
                .metadata()?
                .modified()
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            let modified_time: DateTime<Utc> = modified.into();

            files.push(SourceFile {
                id: entry.path().to_string_lossy().to_string(),
                name,
                mime_type: mime_type_for(&entry.file_name().to_string_lossy()).to_string(),
                modified_time,
            });
        }

        // Sort for deterministic ordering
        files.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(files)
    }

    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>> {
        std::fs::read(file_id).with_context(|| format!("Failed to read file: {}", file_id))
    }
}
