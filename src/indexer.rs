//! Per-document embedding and upsert.
//!
//! One embedding call per document (the whole chunk set batched
//! together) keeps provider round-trips bounded. Record ids are
//! deterministic, so re-running ingestion on an unchanged document
//! overwrites records in place and leaves the namespace's record count
//! unchanged.
//!
//! Failure policy: an embedding failure aborts only the current
//! document; an upsert failure is retried once before the document is
//! marked failed. Neither aborts the surrounding batch.

use std::sync::Arc;

use crate::chunker::chunk_page;
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::PipelineError;
use crate::models::{namespace, Chunk, DocIdentity, Document, Page, VectorRecord};
use crate::vector_store::VectorStore;

pub struct Indexer {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkingConfig,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            chunking,
        }
    }

    /// Chunk a document's pages without touching the index. Used by
    /// ingestion dry runs.
    pub fn chunk_document(
        &self,
        doc: &Document,
        identity: &DocIdentity,
        pages: &[Page],
    ) -> Vec<Chunk> {
        pages
            .iter()
            .flat_map(|page| chunk_page(doc, identity, page, &self.chunking))
            .collect()
    }

    /// Embed and upsert one document's chunks into its namespace.
    ///
    /// Returns the number of records written.
    pub async fn index_document(
        &self,
        doc: &Document,
        identity: &DocIdentity,
        pages: &[Page],
    ) -> Result<usize, PipelineError> {
        let chunks = self.chunk_document(doc, identity, pages);
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.metadata.text.clone()).collect();

        // One provider call per document, not per chunk.
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;

        if vectors.len() != chunks.len() {
            return Err(PipelineError::Embedding(format!(
                "provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let dims = self.embedder.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(PipelineError::Embedding(format!(
                "vector dimensionality {} does not match provider dims {}",
                bad.len(),
                dims
            )));
        }

        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, values)| VectorRecord {
                id: chunk.id,
                values,
                metadata: chunk.metadata,
            })
            .collect();

        let ns = namespace(&doc.organization, &doc.doc_type);

        // Upsert gets exactly one retry before the document is failed.
        if let Err(first) = self.store.upsert(&ns, &records).await {
            self.store.upsert(&ns, &records).await.map_err(|retry| {
                PipelineError::Index(format!("{} (first attempt: {})", retry, first))
            })?;
        }

        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::memory::InMemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic embedder: hashes words into a small fixed vector.
    struct StubEmbedder {
        calls: AtomicUsize,
    }

    impl StubEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
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

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("provider unavailable")
        }
    }

    /// Store whose first N upserts fail.
    struct FlakyStore {
        inner: InMemoryStore,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        async fn upsert(&self, ns: &str, records: &[VectorRecord]) -> Result<()> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("transient upsert failure");
            }
            self.inner.upsert(ns, records).await
        }
        async fn query(
            &self,
            ns: &str,
            vector: &[f32],
            top_k: usize,
            filter: Option<&crate::vector_store::MetadataFilter>,
        ) -> Result<Vec<crate::models::QueryMatch>> {
            self.inner.query(ns, vector, top_k, filter).await
        }
        async fn delete_all(&self, ns: &str) -> Result<()> {
            self.inner.delete_all(ns).await
        }
    }

    fn doc() -> (Document, DocIdentity, Vec<Page>) {
        let doc = Document {
            id: "sp-042".into(),
            organization: "Acme Corp".into(),
            doc_type: "Quality Manuals".into(),
            file_name: "SP-042 Internal Audit-REV1.pdf".into(),
            bytes: Vec::new(),
        };
        let identity = DocIdentity {
            doc_code: "SP".into(),
            doc_number: "042".into(),
            doc_version: "REV 1".into(),
            title: "Internal Audit".into(),
        };
        let pages = vec![
            Page {
                page_number: 1,
                text: "internal audits are scheduled annually by the quality manager".into(),
            },
            Page {
                page_number: 2,
                text: "audit findings are recorded and reviewed during management review".into(),
            },
        ];
        (doc, identity, pages)
    }

    fn chunking() -> ChunkingConfig {
        ChunkingConfig {
            window_tokens: 5,
            overlap_tokens: 2,
        }
    }

    #[tokio::test]
    async fn test_one_embed_call_per_document() {
        let embedder = Arc::new(StubEmbedder::new());
        let store = Arc::new(InMemoryStore::new());
        let indexer = Indexer::new(embedder.clone(), store.clone(), chunking());

        let (d, identity, pages) = doc();
        let written = indexer.index_document(&d, &identity, &pages).await.unwrap();

        assert!(written > 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.record_count("acme-corp__quality-manuals"),
            written
        );
    }

    #[tokio::test]
    async fn test_reingestion_is_idempotent() {
        let embedder = Arc::new(StubEmbedder::new());
        let store = Arc::new(InMemoryStore::new());
        let indexer = Indexer::new(embedder, store.clone(), chunking());

        let (d, identity, pages) = doc();
        let first = indexer.index_document(&d, &identity, &pages).await.unwrap();
        let count_after_first = store.record_count("acme-corp__quality-manuals");
        let second = indexer.index_document(&d, &identity, &pages).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            store.record_count("acme-corp__quality-manuals"),
            count_after_first
        );
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_document() {
        let store = Arc::new(InMemoryStore::new());
        let indexer = Indexer::new(Arc::new(FailingEmbedder), store.clone(), chunking());

        let (d, identity, pages) = doc();
        let err = indexer.index_document(&d, &identity, &pages).await.unwrap_err();
        assert_eq!(err.category(), "embedding");
        assert_eq!(store.record_count("acme-corp__quality-manuals"), 0);
    }

    #[tokio::test]
    async fn test_upsert_retried_once_then_succeeds() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryStore::new(),
            failures_left: AtomicUsize::new(1),
        });
        let indexer = Indexer::new(Arc::new(StubEmbedder::new()), store.clone(), chunking());

        let (d, identity, pages) = doc();
        let written = indexer.index_document(&d, &identity, &pages).await.unwrap();
        assert!(written > 0);
        assert_eq!(
            store.inner.record_count("acme-corp__quality-manuals"),
            written
        );
    }

    #[tokio::test]
    async fn test_upsert_fails_after_single_retry() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryStore::new(),
            failures_left: AtomicUsize::new(2),
        });
        let indexer = Indexer::new(Arc::new(StubEmbedder::new()), store.clone(), chunking());

        let (d, identity, pages) = doc();
        let err = indexer.index_document(&d, &identity, &pages).await.unwrap_err();
        assert_eq!(err.category(), "index");
        assert_eq!(store.inner.record_count("acme-corp__quality-manuals"), 0);
    }

    #[tokio::test]
    async fn test_empty_pages_write_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let indexer = Indexer::new(Arc::new(StubEmbedder::new()), store.clone(), chunking());

        let (d, identity, _) = doc();
        let written = indexer.index_document(&d, &identity, &[]).await.unwrap();
        assert_eq!(written, 0);
    }
}
