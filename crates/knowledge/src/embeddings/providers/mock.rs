//! Deterministic trigram embedder.

use crate::embeddings::Embedder;
use ragchat_core::AppResult;
use std::collections::{BTreeMap, HashSet};

/// Offline embedder for tests and development.
///
/// Hashes character trigrams and whole words into a fixed number of buckets
/// and normalizes the result to unit length. Not semantic, but texts sharing
/// vocabulary land close together, and the same text always maps to the same
/// vector.
#[derive(Debug)]
pub struct MockEmbedder {
    dimensions: usize,
    stop_words: HashSet<&'static str>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let stop_words = [
            "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to",
            "of", "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have",
            "has", "had", "it", "its", "their", "they", "them", "what", "does", "how",
        ]
        .into_iter()
        .collect();

        Self {
            dimensions: dimensions.max(1),
            stop_words,
        }
    }

    fn bucket(&self, s: &str, seed: u64) -> usize {
        let hash = s
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(seed).wrapping_add(b as u64));
        (hash % self.dimensions as u64) as usize
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();

        let mut word_freq: BTreeMap<&str, u32> = BTreeMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !self.stop_words.contains(*w))
        {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in &word_freq {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                embedding[self.bucket(&trigram, 37)] += (*freq as f32).sqrt();
            }
            embedding[self.bucket(word, 31)] += *freq as f32;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl Embedder for MockEmbedder {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_index::cosine_similarity;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn test_unit_length_and_dimensions() {
        let embedder = MockEmbedder::new(384);
        let texts = vec![
            "hello world".to_string(),
            "Gamedex é um aplicativo 🎮 brasileiro para gerenciar jogos!".to_string(),
        ];

        let embeddings = embedder.embed_documents(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        for embedding in &embeddings {
            assert_eq!(embedding.len(), 384);
            assert!((norm(embedding) - 1.0).abs() < 0.001);
        }
    }

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = MockEmbedder::new(128);
        let a = embedder.embed_query("deterministic test").await.unwrap();
        let b = embedder.embed_query("deterministic test").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = MockEmbedder::new(32);
        let embedding = embedder.embed_query("").await.unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_shared_vocabulary_scores_higher() {
        let embedder = MockEmbedder::new(384);
        let query = embedder.embed_query("Which planet has rings?").await.unwrap();
        let near = embedder
            .embed_query("Saturn is the planet with prominent rings.")
            .await
            .unwrap();
        let far = embedder
            .embed_query("Bread dough rises when yeast ferments sugar.")
            .await
            .unwrap();

        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }
}
