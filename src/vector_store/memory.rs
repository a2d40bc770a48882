//! In-memory [`VectorStore`] implementation for tests and dry runs.
//!
//! Namespaces are `HashMap`s keyed by record id behind a `RwLock`, so
//! upserts overwrite in place and the idempotence guarantee is trivially
//! observable via [`InMemoryStore::record_count`]. Query is brute-force
//! cosine similarity over every record in the namespace.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{QueryMatch, VectorRecord};

use super::{MetadataFilter, VectorStore};

#[derive(Default)]
pub struct InMemoryStore {
    namespaces: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held in a namespace.
    pub fn record_count(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .unwrap()
            .get(namespace)
            .map_or(0, HashMap::len)
    }

    /// All namespace keys with at least one record.
    pub fn namespaces(&self) -> Vec<String> {
        let guard = self.namespaces.read().unwrap();
        let mut keys: Vec<String> = guard
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        let mut guard = self.namespaces.write().unwrap();
        let ns = guard.entry(namespace.to_string()).or_default();
        for record in records {
            ns.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        let guard = self.namespaces.read().unwrap();
        let Some(ns) = guard.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<QueryMatch> = ns
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| QueryMatch {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_all(&self, namespace: &str) -> Result<()> {
        self.namespaces.write().unwrap().remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn record(id: &str, values: Vec<f32>, doc_code: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: ChunkMetadata {
                text: format!("text of {}", id),
                document_id: "doc".into(),
                organization: "acme".into(),
                doc_type: "procedures".into(),
                doc_code: doc_code.into(),
                doc_number: "001".into(),
                doc_version: String::new(),
                title: "Test".into(),
                file_name: "t.pdf".into(),
                page: 1,
                chunk_index: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_id() {
        let store = InMemoryStore::new();
        store
            .upsert("acme__forms", &[record("c1", vec![1.0, 0.0], "FM")])
            .await
            .unwrap();
        store
            .upsert("acme__forms", &[record("c1", vec![0.0, 1.0], "FM")])
            .await
            .unwrap();
        assert_eq!(store.record_count("acme__forms"), 1);
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let store = InMemoryStore::new();
        store
            .upsert(
                "ns",
                &[
                    record("far", vec![0.0, 1.0], "SP"),
                    record("near", vec![1.0, 0.1], "SP"),
                ],
            )
            .await
            .unwrap();

        let matches = store.query("ns", &[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(matches[0].id, "near");
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn test_query_applies_filter() {
        let store = InMemoryStore::new();
        store
            .upsert(
                "ns",
                &[
                    record("a", vec![1.0, 0.0], "SP"),
                    record("b", vec![1.0, 0.0], "FM"),
                ],
            )
            .await
            .unwrap();

        let filter = MetadataFilter::doc_code_eq("FM");
        let matches = store.query("ns", &[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "b");
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = InMemoryStore::new();
        store
            .upsert("acme__forms", &[record("c1", vec![1.0, 0.0], "FM")])
            .await
            .unwrap();

        let matches = store.query("other__forms", &[1.0, 0.0], 10, None).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_empties_namespace() {
        let store = InMemoryStore::new();
        store
            .upsert("ns", &[record("c1", vec![1.0, 0.0], "FM")])
            .await
            .unwrap();
        store.delete_all("ns").await.unwrap();
        assert_eq!(store.record_count("ns"), 0);
        let matches = store.query("ns", &[1.0, 0.0], 10, None).await.unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
