//! Vector similarity utilities.
//!
//! Pure-Rust cosine similarity and a stable top-k ranking over stored chunk
//! embeddings.

use std::cmp::Ordering;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length, empty, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank stored vectors against a query embedding.
///
/// Returns `(position, score)` pairs by descending similarity, at most
/// `limit` of them. Equal scores keep storage order.
pub fn rank_by_similarity(vectors: &[Vec<f32>], query: &[f32], limit: usize) -> Vec<(usize, f32)> {
    let scores = vectors
        .iter()
        .map(|v| cosine_similarity(v, query))
        .collect::<Vec<_>>();
    top_k(&scores, limit)
}

/// Stable descending top-k over a score slice.
pub(crate) fn top_k(scores: &[f32], limit: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    // sort_by is stable, so ties stay in storage order
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(limit);
    ranked
}
