//! Vector store abstraction for namespaced chunk storage.
//!
//! The [`VectorStore`] trait covers the three operations the pipeline
//! needs: idempotent upsert, filtered similarity query, and namespace
//! purge. Namespaces partition the index per organization and document
//! type and never mix organizations.
//!
//! Implementations:
//! - **[`PineconeStore`]** — serverless Pinecone index over REST.
//! - **[`memory::InMemoryStore`]** — brute-force cosine store for tests.

pub mod memory;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::VectorStoreConfig;
use crate::models::{ChunkMetadata, QueryMatch, VectorRecord};

/// Equality or set-membership condition on a metadata field.
#[derive(Debug, Clone)]
pub enum FieldFilter {
    Eq(String),
    In(Vec<String>),
}

impl FieldFilter {
    fn matches(&self, value: &str) -> bool {
        match self {
            FieldFilter::Eq(v) => v == value,
            FieldFilter::In(vs) => vs.iter().any(|v| v == value),
        }
    }

    fn to_pinecone(&self) -> serde_json::Value {
        match self {
            FieldFilter::Eq(v) => serde_json::json!({ "$eq": v }),
            FieldFilter::In(vs) => serde_json::json!({ "$in": vs }),
        }
    }
}

/// Native metadata filter over the two filterable fields.
///
/// The store can filter on document codes and numbers only; matching on
/// titles requires the retriever's over-fetch mode instead.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub doc_code: Option<FieldFilter>,
    pub doc_number: Option<FieldFilter>,
}

impl MetadataFilter {
    /// Exact filter on one document code.
    pub fn doc_code_eq(code: &str) -> Self {
        Self {
            doc_code: Some(FieldFilter::Eq(code.to_string())),
            doc_number: None,
        }
    }

    /// Set-membership filter across document codes.
    pub fn doc_code_in(codes: &[String]) -> Self {
        Self {
            doc_code: Some(FieldFilter::In(codes.to_vec())),
            doc_number: None,
        }
    }

    /// Exact filter on a specific document (code and number).
    pub fn document(code: &str, number: &str) -> Self {
        Self {
            doc_code: Some(FieldFilter::Eq(code.to_string())),
            doc_number: Some(FieldFilter::Eq(number.to_string())),
        }
    }

    /// Evaluate the filter against chunk metadata.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.doc_code
            .as_ref()
            .map_or(true, |f| f.matches(&metadata.doc_code))
            && self
                .doc_number
                .as_ref()
                .map_or(true, |f| f.matches(&metadata.doc_number))
    }

    fn to_pinecone(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        if let Some(f) = &self.doc_code {
            obj.insert("doc_code".to_string(), f.to_pinecone());
        }
        if let Some(f) = &self.doc_number {
            obj.insert("doc_number".to_string(), f.to_pinecone());
        }
        serde_json::Value::Object(obj)
    }
}

/// Abstract namespaced vector index.
///
/// Upserts are idempotent and order-independent: the last successful
/// write per record id wins, so concurrent ingestion of distinct
/// documents into one namespace is safe without locking. Queries are
/// read-only and reflect the most recent completed upsert.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records by id.
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()>;

    /// Similarity search within a namespace, most similar first.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>>;

    /// Remove every record in a namespace.
    async fn delete_all(&self, namespace: &str) -> Result<()>;
}

/// Pinecone-backed store over the serverless data-plane REST API.
///
/// Requires the `PINECONE_API_KEY` environment variable and the index
/// host URL from config.
pub struct PineconeStore {
    client: reqwest::Client,
    host: String,
    api_key: String,
}

impl PineconeStore {
    pub fn new(config: &VectorStoreConfig, timeout_secs: u64) -> Result<Self> {
        let host = config
            .index_host
            .clone()
            .ok_or_else(|| anyhow::anyhow!("vector_store.index_host required for pinecone"))?;
        let api_key = std::env::var("PINECONE_API_KEY")
            .map_err(|_| anyhow::anyhow!("PINECONE_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let resp = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            bail!(
                "Pinecone error {} on {}: {}",
                status,
                path,
                resp.text().await.unwrap_or_default()
            );
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let vectors: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "values": r.values,
                    "metadata": r.metadata,
                })
            })
            .collect();

        self.post(
            "/vectors/upsert",
            serde_json::json!({ "namespace": namespace, "vectors": vectors }),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        let mut body = serde_json::json!({
            "namespace": namespace,
            "topK": top_k,
            "vector": vector,
            "includeMetadata": true,
        });
        if let Some(f) = filter {
            body["filter"] = f.to_pinecone();
        }

        let json = self.post("/query", body).await?;
        let matches = json
            .get("matches")
            .and_then(|m| m.as_array())
            .cloned()
            .unwrap_or_default();

        let mut out = Vec::with_capacity(matches.len());
        for m in matches {
            let id = m.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let score = m.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
            let metadata: ChunkMetadata = serde_json::from_value(
                m.get("metadata").cloned().unwrap_or(serde_json::Value::Null),
            )
            .map_err(|e| anyhow::anyhow!("Pinecone match {} has invalid metadata: {}", id, e))?;
            out.push(QueryMatch { id, score, metadata });
        }
        Ok(out)
    }

    async fn delete_all(&self, namespace: &str) -> Result<()> {
        self.post(
            "/vectors/delete",
            serde_json::json!({ "namespace": namespace, "deleteAll": true }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(code: &str, number: &str) -> ChunkMetadata {
        ChunkMetadata {
            text: String::new(),
            document_id: "d".into(),
            organization: "acme".into(),
            doc_type: "forms".into(),
            doc_code: code.into(),
            doc_number: number.into(),
            doc_version: String::new(),
            title: String::new(),
            file_name: String::new(),
            page: 1,
            chunk_index: 0,
        }
    }

    #[test]
    fn test_eq_filter() {
        let f = MetadataFilter::doc_code_eq("SP");
        assert!(f.matches(&meta("SP", "042")));
        assert!(!f.matches(&meta("FM", "042")));
    }

    #[test]
    fn test_in_filter() {
        let f = MetadataFilter::doc_code_in(&["QM".to_string(), "SP".to_string()]);
        assert!(f.matches(&meta("QM", "001")));
        assert!(f.matches(&meta("SP", "042")));
        assert!(!f.matches(&meta("FM", "105")));
    }

    #[test]
    fn test_document_filter_requires_both_fields() {
        let f = MetadataFilter::document("FM", "105");
        assert!(f.matches(&meta("FM", "105")));
        assert!(!f.matches(&meta("FM", "106")));
        assert!(!f.matches(&meta("SP", "105")));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let f = MetadataFilter::default();
        assert!(f.matches(&meta("FM", "105")));
    }

    #[test]
    fn test_pinecone_filter_shape() {
        let f = MetadataFilter::document("FM", "105");
        let json = f.to_pinecone();
        assert_eq!(json["doc_code"]["$eq"], "FM");
        assert_eq!(json["doc_number"]["$eq"], "105");

        let f = MetadataFilter::doc_code_in(&["QM".to_string(), "SP".to_string()]);
        let json = f.to_pinecone();
        assert_eq!(json["doc_code"]["$in"][1], "SP");
    }
}
