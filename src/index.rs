//! In-memory vector index over the chunk sequence.
//!
//! Brute-force cosine search: every query scores every chunk. The index is
//! rebuilt from scratch on each ingest and never persisted.

use anyhow::{bail, Result};
use tracing::info;

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{Chunk, SourceSnippet};

#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: String,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Embed every chunk with `embedder` and index the results.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<Self> {
        if chunks.is_empty() {
            bail!("Cannot build an index over zero chunks");
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            bail!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let entries: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk { chunk, vector })
            .collect();

        info!(
            chunks = entries.len(),
            model = embedder.model_name(),
            "built vector index"
        );
        Ok(Self {
            model: embedder.model_name().to_string(),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// The `k` chunks most similar to `query_vec`, best first. Ties keep
    /// chunk order.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<SourceSnippet> {
        let mut scored: Vec<SourceSnippet> = self
            .entries
            .iter()
            .map(|e| SourceSnippet {
                chunk_index: e.chunk.index,
                score: cosine_similarity(query_vec, &e.vector),
                text: e.chunk.text.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Maps each text to a fixed 2-d vector by its first letter.
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| match t.chars().next() {
                    Some('x') => vec![1.0, 0.0],
                    Some('y') => vec![0.0, 1.0],
                    _ => vec![1.0, 1.0],
                })
                .collect())
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(index, t)| Chunk {
                index,
                text: t.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let index = VectorIndex::build(chunks(&["x one", "y two", "both"]), &AxisEmbedder)
            .await
            .unwrap();
        assert_eq!(index.len(), 3);

        let hits = index.search(&[0.0, 1.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "y two");
        assert_eq!(hits[1].text, "both");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn k_larger_than_index() {
        let index = VectorIndex::build(chunks(&["x"]), &AxisEmbedder).await.unwrap();
        assert_eq!(index.search(&[1.0, 0.0], 5).len(), 1);
    }

    #[tokio::test]
    async fn empty_input_rejected() {
        assert!(VectorIndex::build(Vec::new(), &AxisEmbedder).await.is_err());
    }
}
