//! Math utilities for vector scoring
//!
//! Shared by the semantic retriever. See `semantic.rs` for how scores are
//! turned into ranked candidates.

/// Dot product of two vectors (= cosine similarity for L2-normalized rows).
/// Uses SIMD acceleration when available.
///
/// Returns `None` if the vectors differ in length, are empty, or the result
/// is non-finite, so callers can skip bad rows instead of panicking.
pub(crate) fn dot(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    use simsimd::SpatialSimilarity;
    let score = f32::dot(a, b).unwrap_or_else(|| {
        // Fallback for unsupported architectures - accumulate in f64 for precision
        a.iter()
            .zip(b)
            .map(|(&x, &y)| (x as f64) * (y as f64))
            .sum::<f64>()
    }) as f32;
    if score.is_finite() {
        Some(score)
    } else {
        None
    }
}

/// Indices of the `k` highest scores, sorted descending (ties by index).
///
/// Partial selection first (O(n) expected), then a small sort of just the
/// winners, instead of sorting the whole score array.
pub(crate) fn top_k_desc(scores: &[f32], k: usize) -> Vec<usize> {
    let n = scores.len();
    let k = k.min(n);
    if k == 0 {
        return Vec::new();
    }
    let mut indices: Vec<usize> = (0..n).collect();
    let by_score_desc = |a: &usize, b: &usize| {
        scores[*b]
            .total_cmp(&scores[*a])
            .then_with(|| a.cmp(b))
    };
    if k < n {
        indices.select_nth_unstable_by(k - 1, by_score_desc);
        indices.truncate(k);
    }
    indices.sort_unstable_by(by_score_desc);
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(mut v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }

    #[test]
    fn test_dot_identical_unit_vectors() {
        let a = normalize(vec![0.5; 64]);
        let sim = dot(&a, &a).expect("valid vectors");
        assert!((sim - 1.0).abs() < 1e-4, "Expected ~1.0, got {}", sim);
    }

    #[test]
    fn test_dot_orthogonal() {
        let mut a = vec![0.0; 64];
        let mut b = vec![0.0; 64];
        a[0] = 1.0;
        b[1] = 1.0;
        let sim = dot(&a, &b).expect("valid vectors");
        assert!(sim.abs() < 1e-6, "Expected ~0, got {}", sim);
    }

    #[test]
    fn test_dot_symmetric() {
        let a: Vec<f32> = (0..64).map(|i| (i as f32) / 64.0).collect();
        let b: Vec<f32> = (0..64).map(|i| 1.0 - (i as f32) / 64.0).collect();
        let ab = dot(&a, &b).unwrap();
        let ba = dot(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_dot_length_mismatch() {
        let a = vec![0.5; 63];
        let b = vec![0.5; 64];
        assert!(dot(&a, &b).is_none());
        assert!(dot(&[], &[]).is_none());
    }

    #[test]
    fn test_top_k_selects_highest() {
        let scores = vec![0.1, 0.9, 0.5, 0.7, 0.3];
        assert_eq!(top_k_desc(&scores, 3), vec![1, 3, 2]);
    }

    #[test]
    fn test_top_k_ties_break_by_index() {
        let scores = vec![0.5, 0.9, 0.5, 0.5];
        assert_eq!(top_k_desc(&scores, 3), vec![1, 0, 2]);
    }

    #[test]
    fn test_top_k_larger_than_input() {
        let scores = vec![0.2, 0.8];
        assert_eq!(top_k_desc(&scores, 10), vec![1, 0]);
    }

    #[test]
    fn test_top_k_zero_or_empty() {
        assert!(top_k_desc(&[0.5], 0).is_empty());
        assert!(top_k_desc(&[], 5).is_empty());
    }
}
