//! Retrieval strategies over the namespaced index.
//!
//! Three similarity modes plus a direct form fetch:
//!
//! - **by_doc_code** — similarity search filtered to one document code.
//! - **by_doc_codes** — similarity search filtered to a set of codes.
//! - **by_title_keyword** — the store cannot filter on titles natively,
//!   so this over-fetches unfiltered candidates and keeps those whose
//!   title or file name contains the keyword.
//! - **form_by_code** — metadata-only fetch of a specific form by code
//!   and number, using a zero query vector.
//!
//! The similarity modes drop matches at or below the score threshold;
//! the direct form fetch does not, since its zero vector makes every
//! score meaningless. A store failure surfaces as a retrieval error,
//! which callers must keep distinct from an empty result.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::PipelineError;
use crate::models::{namespace, QueryMatch, RetrievedChunk};
use crate::vector_store::{MetadataFilter, VectorStore};

/// Retrieval seam the query router drives.
#[async_trait]
pub trait Retrieve: Send + Sync {
    /// Similarity search restricted to one document code.
    async fn by_doc_code(
        &self,
        question: &str,
        organization: &str,
        doc_type: &str,
        doc_code: &str,
    ) -> Result<Vec<RetrievedChunk>, PipelineError>;

    /// Similarity search restricted to a set of document codes.
    async fn by_doc_codes(
        &self,
        question: &str,
        organization: &str,
        doc_type: &str,
        doc_codes: &[String],
    ) -> Result<Vec<RetrievedChunk>, PipelineError>;

    /// Similarity search post-filtered on title/file-name substring.
    async fn by_title_keyword(
        &self,
        question: &str,
        organization: &str,
        doc_type: &str,
        keyword: &str,
    ) -> Result<Vec<RetrievedChunk>, PipelineError>;

    /// Fetch a specific form's chunks by code and number.
    async fn form_by_code(
        &self,
        organization: &str,
        doc_type: &str,
        doc_code: &str,
        doc_number: &str,
    ) -> Result<Vec<RetrievedChunk>, PipelineError>;
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Query the store with one retry on failure.
    async fn query(
        &self,
        ns: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>, PipelineError> {
        match self.store.query(ns, vector, top_k, filter).await {
            Ok(matches) => Ok(matches),
            Err(first) => self
                .store
                .query(ns, vector, top_k, filter)
                .await
                .map_err(|retry| {
                    PipelineError::Retrieval(format!("{} (first attempt: {})", retry, first))
                }),
        }
    }

    async fn embed(&self, question: &str) -> Result<Vec<f32>, PipelineError> {
        embed_query(self.embedder.as_ref(), question)
            .await
            .map_err(|e| PipelineError::Retrieval(format!("query embedding failed: {}", e)))
    }

    fn above_threshold(&self, matches: Vec<QueryMatch>) -> Vec<RetrievedChunk> {
        matches
            .into_iter()
            .filter(|m| m.score > self.config.score_threshold)
            .map(RetrievedChunk::from_match)
            .collect()
    }
}

#[async_trait]
impl Retrieve for Retriever {
    async fn by_doc_code(
        &self,
        question: &str,
        organization: &str,
        doc_type: &str,
        doc_code: &str,
    ) -> Result<Vec<RetrievedChunk>, PipelineError> {
        let ns = namespace(organization, doc_type);
        let vector = self.embed(question).await?;
        let filter = MetadataFilter::doc_code_eq(doc_code);
        let matches = self
            .query(&ns, &vector, self.config.top_k, Some(&filter))
            .await?;
        Ok(self.above_threshold(matches))
    }

    async fn by_doc_codes(
        &self,
        question: &str,
        organization: &str,
        doc_type: &str,
        doc_codes: &[String],
    ) -> Result<Vec<RetrievedChunk>, PipelineError> {
        let ns = namespace(organization, doc_type);
        let vector = self.embed(question).await?;
        let filter = MetadataFilter::doc_code_in(doc_codes);
        let matches = self
            .query(&ns, &vector, self.config.top_k, Some(&filter))
            .await?;
        Ok(self.above_threshold(matches))
    }

    async fn by_title_keyword(
        &self,
        question: &str,
        organization: &str,
        doc_type: &str,
        keyword: &str,
    ) -> Result<Vec<RetrievedChunk>, PipelineError> {
        let ns = namespace(organization, doc_type);
        let vector = self.embed(question).await?;

        // Over-fetch unfiltered candidates, then match locally.
        let candidates = self
            .query(
                &ns,
                &vector,
                self.config.top_k * self.config.overfetch_factor,
                None,
            )
            .await?;

        let needle = keyword.to_lowercase();
        let mut chunks: Vec<RetrievedChunk> = self
            .above_threshold(candidates)
            .into_iter()
            .filter(|c| {
                c.metadata.title.to_lowercase().contains(&needle)
                    || c.metadata.file_name.to_lowercase().contains(&needle)
            })
            .collect();
        chunks.truncate(self.config.top_k);
        Ok(chunks)
    }

    async fn form_by_code(
        &self,
        organization: &str,
        doc_type: &str,
        doc_code: &str,
        doc_number: &str,
    ) -> Result<Vec<RetrievedChunk>, PipelineError> {
        let ns = namespace(organization, doc_type);

        // Metadata-only fetch: similarity is irrelevant, so the query
        // vector is all zeros and no threshold applies.
        let vector = vec![0.0f32; self.embedder.dims()];
        let filter = MetadataFilter::document(doc_code, doc_number);
        let matches = self
            .query(&ns, &vector, self.config.form_top_k, Some(&filter))
            .await?;
        Ok(matches.into_iter().map(RetrievedChunk::from_match).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, VectorRecord};
    use crate::vector_store::memory::InMemoryStore;
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds the word "audit" near [1, 0] and everything else near [0, 1].
    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.to_lowercase().contains("audit") {
                        vec![1.0, 0.1]
                    } else {
                        vec![0.1, 1.0]
                    }
                })
                .collect())
        }
    }

    fn record(
        id: &str,
        values: Vec<f32>,
        code: &str,
        number: &str,
        title: &str,
        file_name: &str,
    ) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: ChunkMetadata {
                text: format!("text of {}", id),
                document_id: id.to_string(),
                organization: "acme".into(),
                doc_type: "procedures".into(),
                doc_code: code.into(),
                doc_number: number.into(),
                doc_version: String::new(),
                title: title.into(),
                file_name: file_name.into(),
                page: 1,
                chunk_index: 0,
            },
        }
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert(
                "acme__procedures",
                &[
                    record(
                        "sp-042-p1-c0",
                        vec![1.0, 0.1],
                        "SP",
                        "042",
                        "Internal Audit",
                        "SP-042 Internal Audit-REV1.pdf",
                    ),
                    record(
                        "sp-108-p1-c0",
                        vec![0.1, 1.0],
                        "SP",
                        "108",
                        "Complaint Handling",
                        "SP-108 Complaint Handling-REV3.pdf",
                    ),
                    record(
                        "fm-105-p1-c0",
                        vec![0.5, 0.5],
                        "FM",
                        "105",
                        "Supplier Evaluation",
                        "FM-105 Supplier Evaluation-REV2.pdf",
                    ),
                ],
            )
            .await
            .unwrap();
        store
    }

    fn retriever(store: Arc<InMemoryStore>) -> Retriever {
        Retriever::new(Arc::new(AxisEmbedder), store, RetrievalConfig::default())
    }

    #[tokio::test]
    async fn test_by_doc_code_filters_and_ranks() {
        let retriever = retriever(seeded_store().await);
        let chunks = retriever
            .by_doc_code("how are audits scheduled", "acme", "procedures", "SP")
            .await
            .unwrap();

        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.metadata.doc_code == "SP"));
        assert_eq!(chunks[0].metadata.doc_number, "042");
    }

    #[tokio::test]
    async fn test_by_doc_codes_set_filter() {
        let retriever = retriever(seeded_store().await);
        let chunks = retriever
            .by_doc_codes(
                "audit requirements",
                "acme",
                "procedures",
                &["SP".to_string(), "FM".to_string()],
            )
            .await
            .unwrap();

        assert!(chunks
            .iter()
            .all(|c| c.metadata.doc_code == "SP" || c.metadata.doc_code == "FM"));
    }

    #[tokio::test]
    async fn test_threshold_drops_weak_matches() {
        let retriever = retriever(seeded_store().await);
        // "audit" embeds near [1, 0]; Complaint Handling sits near [0, 1]
        // and scores below the threshold.
        let chunks = retriever
            .by_doc_code("audit process", "acme", "procedures", "SP")
            .await
            .unwrap();

        assert!(chunks.iter().all(|c| c.metadata.doc_number != "108"));
    }

    #[tokio::test]
    async fn test_by_title_keyword_substring_match() {
        let retriever = retriever(seeded_store().await);
        let chunks = retriever
            .by_title_keyword(
                "what does the supplier evaluation form cover during an audit",
                "acme",
                "procedures",
                "supplier",
            )
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.doc_code, "FM");
    }

    #[tokio::test]
    async fn test_form_by_code_ignores_threshold() {
        let retriever = retriever(seeded_store().await);
        // Zero query vector scores every match 0.0; the fetch must still
        // return the form's chunks.
        let chunks = retriever
            .form_by_code("acme", "procedures", "FM", "105")
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.title, "Supplier Evaluation");
    }

    #[tokio::test]
    async fn test_empty_result_is_ok_not_error() {
        let retriever = retriever(seeded_store().await);
        let chunks = retriever
            .form_by_code("acme", "procedures", "FM", "999")
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }

    /// Store that fails a configurable number of queries.
    struct FlakyQueryStore {
        inner: InMemoryStore,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for FlakyQueryStore {
        async fn upsert(&self, ns: &str, records: &[VectorRecord]) -> Result<()> {
            self.inner.upsert(ns, records).await
        }
        async fn query(
            &self,
            ns: &str,
            vector: &[f32],
            top_k: usize,
            filter: Option<&MetadataFilter>,
        ) -> Result<Vec<QueryMatch>> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("transient query failure");
            }
            self.inner.query(ns, vector, top_k, filter).await
        }
        async fn delete_all(&self, ns: &str) -> Result<()> {
            self.inner.delete_all(ns).await
        }
    }

    #[tokio::test]
    async fn test_query_retried_once() {
        let store = Arc::new(FlakyQueryStore {
            inner: InMemoryStore::new(),
            failures_left: AtomicUsize::new(1),
        });
        store
            .inner
            .upsert(
                "acme__procedures",
                &[record(
                    "sp-042-p1-c0",
                    vec![1.0, 0.1],
                    "SP",
                    "042",
                    "Internal Audit",
                    "SP-042 Internal Audit-REV1.pdf",
                )],
            )
            .await
            .unwrap();

        let retriever = Retriever::new(Arc::new(AxisEmbedder), store, RetrievalConfig::default());
        let chunks = retriever
            .by_doc_code("audit schedule", "acme", "procedures", "SP")
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_persistent_failure_is_retrieval_error() {
        let store = Arc::new(FlakyQueryStore {
            inner: InMemoryStore::new(),
            failures_left: AtomicUsize::new(2),
        });
        let retriever = Retriever::new(Arc::new(AxisEmbedder), store, RetrievalConfig::default());

        let err = retriever
            .by_doc_code("audit schedule", "acme", "procedures", "SP")
            .await
            .unwrap_err();
        assert_eq!(err.category(), "retrieval");
    }
}
