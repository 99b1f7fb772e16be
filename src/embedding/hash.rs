//! Feature-hashing embedder.
//!
//! Lowercased word tokens, minus common stopwords, are hashed into a fixed
//! number of buckets with a sign bit, then the vector is L2-normalised so
//! cosine similarity reduces to a dot product. Texts that share words land
//! close together, which is enough for offline use and for tests. No model
//! download, no network.

use anyhow::Result;
use async_trait::async_trait;

use super::Embedder;

pub const DEFAULT_DIMS: usize = 256;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "if", "in", "is", "it", "its", "me", "my", "of", "on", "or", "that", "the", "their",
    "there", "this", "to", "was", "what", "when", "where", "which", "who", "why", "will", "with",
    "you", "your",
];

/// Lowercase alphanumeric word tokens of `text`, with stopwords removed.
pub fn content_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

pub struct HashEmbedder {
    dims: usize,
    model: String,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            model: format!("feature-hash-{}", dims),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut emb = vec![0.0f32; self.dims];
        for term in content_terms(text) {
            let hash = term
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
                    (acc ^ b as u64).wrapping_mul(0x0100_0000_01b3)
                });
            let bucket = (hash % self.dims as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            emb[bucket] += sign;
        }

        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        emb
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn provider(&self) -> &str {
        "hash"
    }
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn deterministic_and_normalised() {
        let e = HashEmbedder::new(64);
        let a = e.embed_sync("Returns are accepted within thirty days.");
        let b = e.embed_sync("Returns are accepted within thirty days.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_words_score_higher() {
        let e = HashEmbedder::new(DEFAULT_DIMS);
        let q = e.embed_sync("How many days do I have to return an item?");
        let related = e.embed_sync("You can return an item within thirty days of delivery.");
        let unrelated = e.embed_sync("Sellers must upload tracking numbers for shipments.");
        assert!(cosine_similarity(&q, &related) > cosine_similarity(&q, &unrelated));
    }

    #[test]
    fn stopword_only_text_is_zero_vector() {
        let e = HashEmbedder::new(16);
        assert!(e.embed_sync("what is the").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn content_terms_lowercase_and_filter() {
        assert_eq!(
            content_terms("What is the Return-Window?"),
            vec!["return".to_string(), "window".to_string()]
        );
    }
}
