//! Batch ingestion: walk the configured targets, OCR each file, and
//! index the chunks into the target's namespace.
//!
//! A failing file never takes the batch down with it. Fetch and OCR
//! failures skip the file; embedding and upsert failures abort that
//! document; everything is tallied in the [`IngestReport`].

use crate::config::Config;
use crate::connector::{is_supported, SourceConnector};
use crate::error::PipelineError;
use crate::indexer::Indexer;
use crate::metadata::MetadataExtractor;
use crate::models::{namespace, Document};
use crate::ocr::OcrEngine;

#[derive(Debug, Default, Clone)]
pub struct IngestOptions {
    /// Chunk and count without embedding or upserting.
    pub dry_run: bool,
    /// Stop after this many files per target.
    pub limit: Option<usize>,
    /// Restrict the run to one organization.
    pub organization: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub file_name: String,
    pub category: &'static str,
    pub reason: String,
}

/// Outcome of one `sync` run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub targets_processed: usize,
    pub files_listed: usize,
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub skipped: Vec<SkippedFile>,
}

impl IngestReport {
    pub fn print_summary(&self, dry_run: bool) {
        println!();
        if dry_run {
            println!("Dry run complete (nothing was written):");
        } else {
            println!("Sync complete:");
        }
        println!("  Targets:   {}", self.targets_processed);
        println!("  Listed:    {} files", self.files_listed);
        println!("  Indexed:   {} documents", self.documents_indexed);
        println!("  Chunks:    {}", self.chunks_indexed);
        println!("  Skipped:   {} files", self.skipped.len());
        for skip in &self.skipped {
            println!("    - {} [{}] {}", skip.file_name, skip.category, skip.reason);
        }
    }
}

pub struct IngestPipeline<'a> {
    config: &'a Config,
    connector: &'a dyn SourceConnector,
    ocr: &'a dyn OcrEngine,
    indexer: &'a Indexer,
    extractor: MetadataExtractor,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(
        config: &'a Config,
        connector: &'a dyn SourceConnector,
        ocr: &'a dyn OcrEngine,
        indexer: &'a Indexer,
    ) -> Self {
        Self {
            config,
            connector,
            ocr,
            indexer,
            extractor: MetadataExtractor::new(),
        }
    }

    /// Run every configured target, optionally filtered to one
    /// organization. Listing failures fail the whole run; file-level
    /// failures are recorded and the run continues.
    pub async fn run(&self, options: &IngestOptions) -> Result<IngestReport, PipelineError> {
        if self.config.targets.is_empty() {
            return Err(PipelineError::Configuration(
                "no [[targets]] configured".to_string(),
            ));
        }

        let mut report = IngestReport::default();

        for target in &self.config.targets {
            if let Some(org) = &options.organization {
                if !target.organization.eq_ignore_ascii_case(org) {
                    continue;
                }
            }

            let ns = namespace(&target.organization, &target.doc_type);
            println!(
                "Syncing {} / {} -> {}",
                target.organization, target.doc_type, ns
            );

            // A folder that cannot be listed skips its target; the other
            // targets still run.
            let files = match self.connector.list(&target.folder_id).await {
                Ok(files) => files,
                Err(e) => {
                    eprintln!("  skipped target {}: {}", ns, e);
                    report.targets_processed += 1;
                    report.skipped.push(SkippedFile {
                        file_name: target.folder_id.clone(),
                        category: "source-fetch",
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            report.targets_processed += 1;
            report.files_listed += files.len();

            let take = options.limit.unwrap_or(files.len());
            for file in files.iter().take(take) {
                if !is_supported(&file.name) {
                    continue;
                }
                match self.ingest_file(target, &file.id, &file.name, options.dry_run).await {
                    Ok(chunks) => {
                        report.documents_indexed += 1;
                        report.chunks_indexed += chunks;
                        println!("  indexed {} ({} chunks)", file.name, chunks);
                    }
                    Err(e) => {
                        eprintln!("  skipped {}: {}", file.name, e);
                        report.skipped.push(SkippedFile {
                            file_name: file.name.clone(),
                            category: e.category(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        if report.targets_processed == 0 {
            return Err(PipelineError::Configuration(format!(
                "no targets matched organization '{}'",
                options.organization.as_deref().unwrap_or("")
            )));
        }

        Ok(report)
    }

    async fn ingest_file(
        &self,
        target: &crate::config::TargetConfig,
        file_id: &str,
        file_name: &str,
        dry_run: bool,
    ) -> Result<usize, PipelineError> {
        let bytes = self
            .connector
            .fetch(file_id)
            .await
            .map_err(|e| PipelineError::SourceFetch {
                file: file_name.to_string(),
                reason: e.to_string(),
            })?;

        let pages = self
            .ocr
            .process(&bytes, file_name)
            .await
            .map_err(|e| PipelineError::Ocr {
                file: file_name.to_string(),
                reason: e.to_string(),
            })?;

        let identity = self.extractor.extract(file_name);

        let doc = Document {
            id: document_id(&identity.doc_code, &identity.doc_number, file_name),
            organization: target.organization.clone(),
            doc_type: target.doc_type.clone(),
            file_name: file_name.to_string(),
            bytes,
        };

        if dry_run {
            return Ok(self.indexer.chunk_document(&doc, &identity, &pages).len());
        }

        self.indexer.index_document(&doc, &identity, &pages).await
    }
}

/// Stable document id: the code and number when the filename carries
/// them, otherwise a slug of the filename. Chunk ids derive from this,
/// so it must not change between runs over the same file.
fn document_id(doc_code: &str, doc_number: &str, file_name: &str) -> String {
    if doc_code != "unknown" && doc_number != "unknown" {
        format!("{}-{}", doc_code.to_lowercase(), doc_number)
    } else {
        file_name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, Config};
    use crate::embedding::EmbeddingProvider;
    use crate::ocr::PlainTextOcr;
    use crate::vector_store::memory::InMemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct HashEmbedder;

    #[async_trait]
    impl EmbeddingProvider for HashEmbedder {
        fn model_name(&self) -> &str {
            "hash"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 8];
                    for word in t.split_whitespace() {
                        let h = word.bytes().fold(0usize, |acc, b| acc * 31 + b as usize);
                        v[h % 8] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn config_with_target(folder: &str) -> Config {
        let toml_str = format!(
            r#"
[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 8

[vector_store]
provider = "memory"

[chunking]
window_tokens = 6
overlap_tokens = 2

[[targets]]
organization = "Acme Corp"
doc_type = "Procedures"
folder_id = "{}"
"#,
            folder.replace('\\', "/")
        );
        toml::from_str(&toml_str).unwrap()
    }

    #[tokio::test]
    async fn test_sync_indexes_supported_files_and_skips_rest() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("SP-042 Internal Audit-REV1.txt"),
            "internal audits are scheduled annually and findings go to management review",
        )
        .unwrap();
        fs::write(tmp.path().join("logo.png"), [0u8; 4]).unwrap();

        let config = config_with_target(tmp.path().to_str().unwrap());
        let store = Arc::new(InMemoryStore::new());
        let indexer = Indexer::new(
            Arc::new(HashEmbedder),
            store.clone(),
            ChunkingConfig {
                window_tokens: 6,
                overlap_tokens: 2,
            },
        );
        let connector = crate::connector_fs::FilesystemConnector::new();
        let ocr = PlainTextOcr;
        let pipeline = IngestPipeline::new(&config, &connector, &ocr, &indexer);

        let report = pipeline.run(&IngestOptions::default()).await.unwrap();

        assert_eq!(report.documents_indexed, 1);
        assert!(report.chunks_indexed > 0);
        assert!(report.skipped.is_empty());
        assert_eq!(
            store.record_count("acme-corp__procedures"),
            report.chunks_indexed
        );
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("QM-001 Quality Manual.txt"),
            "the quality manual defines the scope of the management system",
        )
        .unwrap();

        let config = config_with_target(tmp.path().to_str().unwrap());
        let store = Arc::new(InMemoryStore::new());
        let indexer = Indexer::new(
            Arc::new(HashEmbedder),
            store.clone(),
            ChunkingConfig {
                window_tokens: 6,
                overlap_tokens: 2,
            },
        );
        let connector = crate::connector_fs::FilesystemConnector::new();
        let ocr = PlainTextOcr;
        let pipeline = IngestPipeline::new(&config, &connector, &ocr, &indexer);

        let report = pipeline
            .run(&IngestOptions {
                dry_run: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(report.chunks_indexed > 0);
        assert_eq!(store.record_count("acme-corp__procedures"), 0);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("SP-042 Internal Audit.txt"),
            "audit schedule content",
        )
        .unwrap();
        // Invalid UTF-8 makes the plain OCR engine fail for this file.
        fs::write(tmp.path().join("FM-105 Supplier Evaluation.txt"), [0xff, 0xfe]).unwrap();

        let config = config_with_target(tmp.path().to_str().unwrap());
        let store = Arc::new(InMemoryStore::new());
        let indexer = Indexer::new(
            Arc::new(HashEmbedder),
            store.clone(),
            ChunkingConfig {
                window_tokens: 6,
                overlap_tokens: 2,
            },
        );
        let connector = crate::connector_fs::FilesystemConnector::new();
        let ocr = PlainTextOcr;
        let pipeline = IngestPipeline::new(&config, &connector, &ocr, &indexer);

        let report = pipeline.run(&IngestOptions::default()).await.unwrap();

        assert_eq!(report.documents_indexed, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].category, "ocr");
    }

    #[tokio::test]
    async fn test_missing_targets_is_configuration_error() {
        let toml_str = r#"
[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 8

[vector_store]
provider = "memory"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let store = Arc::new(InMemoryStore::new());
        let indexer = Indexer::new(Arc::new(HashEmbedder), store, ChunkingConfig::default());
        let connector = crate::connector_fs::FilesystemConnector::new();
        let ocr = PlainTextOcr;
        let pipeline = IngestPipeline::new(&config, &connector, &ocr, &indexer);

        let err = pipeline.run(&IngestOptions::default()).await.unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_document_id_is_stable() {
        assert_eq!(document_id("SP", "042", "SP-042 Internal Audit.pdf"), "sp-042");
        assert_eq!(
            document_id("unknown", "unknown", "Notes.pdf"),
            "notes-pdf"
        );
    }
}
