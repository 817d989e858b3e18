//! Result ranking for hybrid retrieval
//!
//! This module handles:
//! - BM25 keyword scoring over a candidate set
//! - Score normalization
//! - Weighted fusion of vector and keyword scores

use serde_json::{Map, Value};

/// A candidate segment scored by vector similarity
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub vector_score: f32,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// A candidate after hybrid scoring
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub id: String,
    pub score: f32,
    pub vector_score: f32,
    pub bm25_score: f32,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// Rank and merge search results
pub struct Ranker {
    bm25_weight: f32,
    vector_weight: f32,
}

impl Ranker {
    /// Create a new ranker
    pub fn new(bm25_weight: f32) -> Self {
        let bm25_weight = bm25_weight.clamp(0.0, 1.0);
        Self {
            bm25_weight,
            vector_weight: 1.0 - bm25_weight,
        }
    }

    /// Fuse vector scores with normalized BM25 scores and keep the best `top_k`
    pub fn rank_hybrid(&self, query: &str, candidates: Vec<Candidate>, top_k: usize) -> Vec<RankedResult> {
        let scorer = Bm25Scorer::new();
        let terms = scorer.tokenize(query);

        let avg_doc_len = if candidates.is_empty() {
            1.0
        } else {
            let total: usize = candidates.iter().map(|c| c.text.len()).sum();
            (total as f32 / candidates.len() as f32).max(1.0)
        };

        let raw: Vec<f32> = candidates
            .iter()
            .map(|c| scorer.score(&terms, &c.text, avg_doc_len))
            .collect();
        let max_bm25 = raw.iter().cloned().fold(0.0_f32, f32::max);

        let mut ranked: Vec<RankedResult> = candidates
            .into_iter()
            .zip(raw)
            .map(|(c, bm25)| {
                let bm25_score = if max_bm25 > 0.0 { bm25 / max_bm25 } else { 0.0 };
                RankedResult {
                    score: self.vector_weight * c.vector_score + self.bm25_weight * bm25_score,
                    vector_score: c.vector_score,
                    bm25_score,
                    id: c.id,
                    text: c.text,
                    metadata: c.metadata,
                }
            })
            .collect();

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);
        ranked
    }
}

/// Simple BM25 scorer
pub struct Bm25Scorer {
    k1: f32,
    b: f32,
}

impl Bm25Scorer {
    pub fn new() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }

    /// Score a single document against a query
    pub fn score(&self, query_terms: &[String], doc_text: &str, avg_doc_len: f32) -> f32 {
        let doc_lower = doc_text.to_lowercase();
        let doc_len = doc_text.len() as f32;
        let mut total_score = 0.0;

        for term in query_terms {
            let tf = doc_lower.matches(term.as_str()).count() as f32;

            if tf > 0.0 {
                // No corpus statistics: every term weighs the same
                let numerator = tf * (self.k1 + 1.0);
                let denominator = tf + self.k1 * (1.0 - self.b + self.b * (doc_len / avg_doc_len));
                total_score += numerator / denominator;
            }
        }

        total_score
    }

    /// Tokenize query into lowercase terms of at least two characters
    pub fn tokenize(&self, query: &str) -> Vec<String> {
        query
            .split(|c: char| !c.is_alphanumeric())
            .map(|s| s.to_lowercase())
            .filter(|s| s.chars().count() >= 2)
            .collect()
    }
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Self::new()
    }
}
