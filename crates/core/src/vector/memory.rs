//! In-memory vector store
//!
//! Scores examples by cosine similarity of term-frequency vectors. Results
//! are deterministic for a fixed set of examples: ties keep insertion order.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{FewShotExample, VectorStore};
use crate::Result;

type TermVector = HashMap<String, f32>;

struct Entry {
    example: FewShotExample,
    terms: TermVector,
}

/// Vector store held entirely in memory
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `examples`
    pub fn from_examples(examples: impl IntoIterator<Item = FewShotExample>) -> Self {
        let entries = examples.into_iter().map(Entry::new).collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Index another example
    pub async fn add(&self, example: FewShotExample) {
        self.entries.write().await.push(Entry::new(example));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Entry {
    fn new(example: FewShotExample) -> Self {
        let terms = term_vector(&example.question);
        Self { example, terms }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<FewShotExample>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_terms = term_vector(query);
        let entries = self.entries.read().await;

        let mut scored: Vec<(f32, &FewShotExample)> = entries
            .iter()
            .map(|entry| (cosine_similarity(&query_terms, &entry.terms), &entry.example))
            .collect();

        // stable sort, so equal scores keep insertion order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        debug!("Similarity search returned {} of {} examples", scored.len(), entries.len());

        Ok(scored
            .into_iter()
            .map(|(score, example)| FewShotExample {
                score: Some(score),
                ..example.clone()
            })
            .collect())
    }
}

fn term_vector(text: &str) -> TermVector {
    let mut terms = TermVector::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *terms.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    terms
}

/// Cosine similarity between two sparse vectors
fn cosine_similarity(a: &TermVector, b: &TermVector) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f32 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm_a: f32 = a.values().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.values().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = term_vector("population by state");
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_disjoint() {
        let a = term_vector("population");
        let b = term_vector("inflation rate");
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let store = InMemoryVectorStore::from_examples(vec![
            FewShotExample::new("What was the inflation rate in 2020?", "SELECT 1"),
            FewShotExample::new("Population of Sao Paulo by year", "SELECT 2"),
            FewShotExample::new("Which state has the largest population?", "SELECT 3"),
        ]);

        let results = store
            .similarity_search("largest population by state", 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].artifact, "SELECT 3");
        assert!(results[0].score.unwrap() >= results[1].score.unwrap());
    }

    #[tokio::test]
    async fn test_search_ties_keep_insertion_order() {
        let store = InMemoryVectorStore::new();
        store.add(FewShotExample::new("alpha", "first")).await;
        store.add(FewShotExample::new("beta", "second")).await;

        let results = store.similarity_search("gamma", 2).await.unwrap();
        let artifacts: Vec<&str> = results.iter().map(|e| e.artifact.as_str()).collect();
        assert_eq!(artifacts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_empty_store_and_zero_k() {
        let store = InMemoryVectorStore::new();
        assert!(store.is_empty().await);
        assert!(store.similarity_search("anything", 3).await.unwrap().is_empty());

        store.add(FewShotExample::new("q", "a")).await;
        assert_eq!(store.len().await, 1);
        assert!(store.similarity_search("q", 0).await.unwrap().is_empty());
    }
}
