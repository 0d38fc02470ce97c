//! Maximal Marginal Relevance (MMR)
//!
//! 관련성과 다양성의 균형을 맞춰 후보를 재선택합니다:
//! MMR = λ × sim(query, doc) - (1-λ) × max(sim(doc, selected))
//!
//! λ = 1.0: 관련성만 (일반 검색과 동일)
//! λ = 0.0: 다양성만

use super::vector::cosine_similarity;

/// MMR 후보
#[derive(Debug, Clone)]
pub struct MmrCandidate<T> {
    pub item: T,
    /// 원래 관련성 점수 (반환 시 그대로 유지)
    pub score: f32,
    pub vector: Vec<f32>,
}

/// MMR 선택
///
/// # Arguments
/// * `query` - 질의 벡터
/// * `candidates` - 후보 (fetch_k 개)
/// * `k` - 선택할 개수
/// * `lambda` - 0.0 ~ 1.0 (범위 밖은 잘라냄)
///
/// # Returns
/// 선택 순서대로 (item, 원래 점수)
pub fn mmr_select<T>(
    query: &[f32],
    candidates: Vec<MmrCandidate<T>>,
    k: usize,
    lambda: f32,
) -> Vec<(T, f32)> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let lambda = lambda.clamp(0.0, 1.0);
    let k = k.min(candidates.len());

    // 질의 관련성은 한 번만 계산
    let mut remaining: Vec<(MmrCandidate<T>, f32)> = candidates
        .into_iter()
        .map(|c| {
            let relevance = cosine_similarity(query, &c.vector);
            (c, relevance)
        })
        .collect();

    let mut selected: Vec<MmrCandidate<T>> = Vec::with_capacity(k);

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (idx, (candidate, relevance)) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|s| cosine_similarity(&candidate.vector, &s.vector))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };

            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            // 동점이면 먼저 온 (관련성이 높은) 후보 유지
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        let (best, _) = remaining.remove(best_idx);
        selected.push(best);
    }

    selected.into_iter().map(|c| (c.item, c.score)).collect()
}

// ============================================================================
// Tests
// ============================================================================
