//! Maximal marginal relevance re-ranking.

/// Compute cosine similarity between two vectors.
///
/// Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Greedily select up to `k` candidate indices balancing relevance and novelty.
///
/// Each step picks the candidate maximizing
/// `lambda_mult * sim(query, c) - (1 - lambda_mult) * max(sim(c, selected))`.
/// The first pick is the most similar candidate. Ties go to the lower index,
/// so candidates should be passed most-similar first.
pub fn maximal_marginal_relevance<E: AsRef<[f32]>>(
    query: &[f32],
    candidates: &[E],
    lambda_mult: f32,
    k: usize,
) -> Vec<usize> {
    let limit = k.min(candidates.len());
    if limit == 0 {
        return Vec::new();
    }

    let query_similarity: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c.as_ref()))
        .collect();

    let mut first = 0;
    for (i, score) in query_similarity.iter().enumerate() {
        if *score > query_similarity[first] {
            first = i;
        }
    }

    let mut selected = vec![first];
    // Highest similarity of each candidate to anything selected so far
    let mut redundancy: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(c.as_ref(), candidates[first].as_ref()))
        .collect();

    while selected.len() < limit {
        let mut best: Option<(usize, f32)> = None;
        for (i, relevance) in query_similarity.iter().enumerate() {
            if selected.contains(&i) {
                continue;
            }
            let score = lambda_mult * relevance - (1.0 - lambda_mult) * redundancy[i];
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((i, score));
            }
        }

        let Some((pick, _)) = best else { break };
        selected.push(pick);
        for (i, candidate) in candidates.iter().enumerate() {
            let sim = cosine_similarity(candidate.as_ref(), candidates[pick].as_ref());
            if sim > redundancy[i] {
                redundancy[i] = sim;
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        // Same vector = 1.0
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((sim - 1.0).abs() < 0.001);

        // Orthogonal vectors = 0.0
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 0.001);

        // Opposite vectors = -1.0
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]);
        assert!((sim - (-1.0)).abs() < 0.001);

        // Degenerate inputs
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_mmr_empty() {
        let candidates: Vec<Vec<f32>> = vec![];
        assert!(maximal_marginal_relevance(&[1.0, 0.0], &candidates, 0.5, 3).is_empty());
        assert!(maximal_marginal_relevance(&[1.0, 0.0], &[vec![1.0, 0.0]], 0.5, 0).is_empty());
    }

    #[test]
    fn test_mmr_lambda_one_is_relevance_order() {
        let candidates = vec![vec![1.0, 0.0], vec![0.9, 0.1], vec![0.0, 1.0]];
        let picks = maximal_marginal_relevance(&[1.0, 0.0], &candidates, 1.0, 3);
        assert_eq!(picks, vec![0, 1, 2]);
    }

    #[test]
    fn test_mmr_skips_duplicates() {
        let candidates = vec![
            vec![1.0, 0.0],
            vec![1.0, 0.0],
            vec![1.0, 0.0],
            vec![0.6, 0.8],
        ];
        let picks = maximal_marginal_relevance(&[1.0, 0.0], &candidates, 0.3, 2);
        assert_eq!(picks, vec![0, 3]);
    }

    #[test]
    fn test_mmr_first_pick_is_most_similar() {
        let candidates = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let picks = maximal_marginal_relevance(&[1.0, 0.0], &candidates, 0.7, 1);
        assert_eq!(picks, vec![1]);
    }

    #[test]
    fn test_mmr_never_exceeds_candidates() {
        let candidates = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let picks = maximal_marginal_relevance(&[1.0, 1.0], &candidates, 0.7, 6);
        assert_eq!(picks.len(), 2);
    }
}
