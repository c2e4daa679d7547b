/// Cosine similarity for f32 embedding vectors. Mismatched lengths, empty or
/// zero-norm inputs score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

/// An embedding the detector can compare against.
pub fn is_usable_embedding(embedding: &[f32]) -> bool {
    !embedding.is_empty()
        && embedding.iter().all(|x| x.is_finite())
        && embedding.iter().any(|x| *x != 0.0)
}
