//! Retrieval index over source documents.
//!
//! Source documents (remote pages, uploaded files) are chunked, embedded,
//! and searched by brute-force cosine similarity. The collection is rebuilt
//! wholesale on every `index` call; there is no incremental upsert. Loading
//! and fetching the documents themselves happens outside this crate.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use async_trait::async_trait;

use quill_core::error::{QuillError, Result};

/// Characters per chunk fed to the embedding service.
const CHUNK_SIZE: usize = 512;

/// One source document to be indexed.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Where the body came from (URL or file name).
    pub origin: String,
    pub body: String,
}

impl SourceDocument {
    pub fn new(origin: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            body: body.into(),
        }
    }
}

/// One retrieved chunk.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub origin: String,
    /// Cosine similarity to the query (0.0 to 1.0 for unit vectors).
    pub score: f64,
}

/// Retrieval collaborator seam.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Replace the entire collection with chunks from `documents`.
    /// Returns the number of chunks indexed.
    async fn index(&self, documents: &[SourceDocument]) -> Result<usize>;

    /// Return the top-`k` most relevant chunks for `query`, best first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>>;
}

/// Text-embedding seam.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimensions(&self) -> usize;
}

/// Deterministic feature-hashing embedding.
///
/// Each lowercased token is hashed into one of 384 buckets; the bucket
/// counts are L2-normalized. Identical inputs always produce identical
/// vectors, and texts sharing vocabulary score higher than unrelated ones,
/// which is enough signal for small corpora without a model download.
#[derive(Debug, Clone, Default)]
pub struct HashedEmbedding;

impl HashedEmbedding {
    pub fn new() -> Self {
        Self
    }

    fn hash_to_vector(text: &str) -> Vec<f32> {
        let mut result = vec![0.0f32; 384];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % 384) as usize;
            result[bucket] += 1.0;
        }

        // L2-normalize to unit vectors so cosine reduces to a dot product.
        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }
        result
    }
}

#[async_trait]
impl EmbeddingService for HashedEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(QuillError::Retrieval("Cannot embed empty text".to_string()));
        }
        Ok(Self::hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        384
    }
}

struct IndexedChunk {
    content: String,
    origin: String,
    embedding: Vec<f32>,
}

/// In-memory retriever using brute-force cosine similarity.
///
/// All operations are O(n) over the chunk count, acceptable for the small
/// corpora this application indexes.
pub struct MemoryRetriever {
    embedder: Box<dyn EmbeddingService>,
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl MemoryRetriever {
    pub fn new(embedder: impl EmbeddingService + 'static) -> Self {
        Self {
            embedder: Box::new(embedder),
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Number of chunks currently indexed.
    pub fn len(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Retriever for MemoryRetriever {
    async fn index(&self, documents: &[SourceDocument]) -> Result<usize> {
        let mut rebuilt = Vec::new();
        for document in documents {
            for piece in chunk_text(&document.body, CHUNK_SIZE) {
                let embedding = self.embedder.embed(&piece).await?;
                rebuilt.push(IndexedChunk {
                    content: piece,
                    origin: document.origin.clone(),
                    embedding,
                });
            }
        }

        let count = rebuilt.len();
        let mut chunks = self
            .chunks
            .write()
            .map_err(|e| QuillError::Retrieval(format!("Index lock poisoned: {}", e)))?;
        *chunks = rebuilt;
        tracing::info!(chunks = count, documents = documents.len(), "Retrieval index rebuilt");
        Ok(count)
    }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let query_vec = self.embedder.embed(query).await?;

        let chunks = self
            .chunks
            .read()
            .map_err(|e| QuillError::Retrieval(format!("Index lock poisoned: {}", e)))?;

        let mut scored: Vec<Chunk> = chunks
            .iter()
            .map(|chunk| Chunk {
                content: chunk.content.clone(),
                origin: chunk.origin.clone(),
                score: cosine_similarity(&query_vec, &chunk.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Split text into fixed-size character chunks on whitespace boundaries
/// where possible.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in trimmed.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > size {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        // A single over-long token becomes its own chunk rather than being split.
        current.push_str(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embedding_deterministic() {
        let service = HashedEmbedding::new();
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1.len(), 384);
    }

    #[tokio::test]
    async fn test_embedding_rejects_empty() {
        let service = HashedEmbedding::new();
        assert!(service.embed("").await.is_err());
    }

    #[tokio::test]
    async fn test_shared_vocabulary_scores_higher() {
        let a = HashedEmbedding::hash_to_vector("rust borrow checker ownership");
        let b = HashedEmbedding::hash_to_vector("the rust borrow checker");
        let c = HashedEmbedding::hash_to_vector("pineapple pizza recipes");
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[tokio::test]
    async fn test_index_and_retrieve() {
        let retriever = MemoryRetriever::new(HashedEmbedding::new());
        let docs = vec![
            SourceDocument::new("a.txt", "The deployment pipeline runs nightly."),
            SourceDocument::new("b.txt", "Cats sleep most of the day."),
        ];
        retriever.index(&docs).await.unwrap();
        assert_eq!(retriever.len(), 2);

        let hits = retriever.retrieve("when does the deployment run", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].origin, "a.txt");
    }

    #[tokio::test]
    async fn test_index_is_wholesale_rebuild() {
        let retriever = MemoryRetriever::new(HashedEmbedding::new());
        retriever
            .index(&[SourceDocument::new("old", "first generation content")])
            .await
            .unwrap();
        retriever
            .index(&[SourceDocument::new("new", "second generation content")])
            .await
            .unwrap();

        let hits = retriever.retrieve("generation content", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].origin, "new");
    }

    #[tokio::test]
    async fn test_retrieve_truncates_to_k() {
        let retriever = MemoryRetriever::new(HashedEmbedding::new());
        let docs: Vec<SourceDocument> = (0..5)
            .map(|i| SourceDocument::new(format!("doc{}", i), format!("content number {}", i)))
            .collect();
        retriever.index(&docs).await.unwrap();

        let hits = retriever.retrieve("content", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_retrieve_from_empty_index() {
        let retriever = MemoryRetriever::new(HashedEmbedding::new());
        let hits = retriever.retrieve("anything", 2).await.unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_chunk_text_splits_long_input() {
        let word = "alpha ";
        let text = word.repeat(200); // ~1200 chars
        let chunks = chunk_text(&text, 512);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 512));
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("   ", 512).is_empty());
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_cosine_identical_unit_vectors() {
        let v = HashedEmbedding::hash_to_vector("hello world");
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
