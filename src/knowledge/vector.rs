//! Vector Index - 벡터 인덱스 트레이트 및 유틸리티
//!
//! 인덱스는 빌드 시점에 한 번 전체 재구성되고, 질의 시점에는 읽기 전용입니다.
//! 동시 질의에서 공유하려면 구현체가 읽기에 대해 스레드 안전해야 합니다.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::mmr::{mmr_select, MmrCandidate};
use super::Chunk;
use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 인덱스 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// 질의와의 코사인 유사도
    pub score: f32,
}

/// MMR 후보 (저장된 벡터 포함)
#[derive(Debug, Clone)]
pub struct Candidate {
    pub entry: IndexEntry,
    /// 질의와의 코사인 유사도
    pub score: f32,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// VectorIndex 트레이트 (async)
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 전체 재구성 (기존 내용 삭제 후 저장)
    async fn build(&self, entries: &[IndexEntry]) -> Result<usize>;

    /// 유사도 검색 (특정 출처 제외)
    async fn search_excluding(
        &self,
        query: &[f32],
        k: usize,
        exclude_sources: &BTreeSet<String>,
    ) -> Result<Vec<RetrievedChunk>>;

    /// MMR 후보 조회 (유사도 상위 fetch_k 개, 벡터 포함)
    async fn fetch_candidates(&self, query: &[f32], fetch_k: usize) -> Result<Vec<Candidate>>;

    /// 저장된 엔트리 수
    async fn count(&self) -> Result<usize>;

    /// 유사도 검색
    async fn search_similar(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        self.search_excluding(query, k, &BTreeSet::new()).await
    }

    /// 다양성 검색 (MMR)
    ///
    /// `fetch_k` 개 후보를 먼저 가져온 뒤 `diversity_weight` 로 k 개를 고릅니다.
    /// 1.0 = 관련성만, 0.0 = 다양성만
    async fn search_diverse(
        &self,
        query: &[f32],
        k: usize,
        fetch_k: usize,
        diversity_weight: f32,
    ) -> Result<Vec<RetrievedChunk>> {
        let candidates = self.fetch_candidates(query, fetch_k.max(k)).await?;

        let mmr_candidates = candidates
            .into_iter()
            .map(|c| MmrCandidate {
                item: c.entry.chunk,
                score: c.score,
                vector: c.entry.embedding,
            })
            .collect();

        Ok(mmr_select(query, mmr_candidates, k, diversity_weight)
            .into_iter()
            .map(|(chunk, score)| RetrievedChunk { chunk, score })
            .collect())
    }
}

// ============================================================================
// MemoryVectorIndex
// ============================================================================

/// 메모리 벡터 인덱스 (정확한 brute-force 코사인 검색)
///
/// 테스트 및 소규모 코퍼스용입니다.
#[derive(Debug, Default)]
pub struct MemoryVectorIndex {
    entries: RwLock<Vec<IndexEntry>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    async fn ranked(
        &self,
        query: &[f32],
        exclude_sources: &BTreeSet<String>,
    ) -> Vec<(IndexEntry, f32)> {
        let entries = self.entries.read().await;
        let mut scored: Vec<(IndexEntry, f32)> = entries
            .iter()
            .filter(|e| !exclude_sources.contains(&e.chunk.source))
            .map(|e| (e.clone(), cosine_similarity(query, &e.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn build(&self, entries: &[IndexEntry]) -> Result<usize> {
        if let Some(dim) = entries.first().map(|e| e.embedding.len()) {
            if entries.iter().any(|e| e.embedding.len() != dim) {
                return Err(RagError::index("Inconsistent embedding dimensions"));
            }
        }

        let mut stored = self.entries.write().await;
        *stored = entries.to_vec();
        Ok(stored.len())
    }

    async fn search_excluding(
        &self,
        query: &[f32],
        k: usize,
        exclude_sources: &BTreeSet<String>,
    ) -> Result<Vec<RetrievedChunk>> {
        Ok(self
            .ranked(query, exclude_sources)
            .await
            .into_iter()
            .take(k)
            .map(|(entry, score)| RetrievedChunk {
                chunk: entry.chunk,
                score,
            })
            .collect())
    }

    async fn fetch_candidates(&self, query: &[f32], fetch_k: usize) -> Result<Vec<Candidate>> {
        Ok(self
            .ranked(query, &BTreeSet::new())
            .await
            .into_iter()
            .take(fetch_k)
            .map(|(entry, score)| Candidate { entry, score })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source: &str, index: usize, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                source: source.to_string(),
                page: None,
                index,
                text: format!("{} chunk {}", source, index),
            },
            embedding,
        }
    }

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_empty_or_mismatched() {
        let a: Vec<f32> = vec![];
        assert_eq!(cosine_similarity(&a, &a), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_round_trip_k_equals_n() {
        let index = MemoryVectorIndex::new();
        let entries: Vec<IndexEntry> = (0..7)
            .map(|i| entry("GDPR.txt", i, vec![1.0, i as f32, 0.5]))
            .collect();

        assert_eq!(index.build(&entries).await.unwrap(), 7);
        assert_eq!(index.count().await.unwrap(), 7);

        let results = index.search_similar(&[1.0, 0.0, 0.0], 7).await.unwrap();
        assert_eq!(results.len(), 7);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let index = MemoryVectorIndex::new();
        index
            .build(&[
                entry("A.txt", 0, vec![0.0, 1.0]),
                entry("B.txt", 0, vec![1.0, 0.0]),
                entry("C.txt", 0, vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let results = index.search_similar(&[1.0, 0.0], 3).await.unwrap();
        let sources: Vec<&str> = results.iter().map(|r| r.chunk.source.as_str()).collect();
        assert_eq!(sources, vec!["B.txt", "C.txt", "A.txt"]);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_search_excluding_sources() {
        let index = MemoryVectorIndex::new();
        index
            .build(&[
                entry("GDPR.txt", 0, vec![1.0, 0.0]),
                entry("GDPR.txt", 1, vec![0.9, 0.1]),
                entry("DPDP.txt", 0, vec![0.1, 0.9]),
            ])
            .await
            .unwrap();

        let exclude: BTreeSet<String> = ["GDPR.txt".to_string()].into_iter().collect();
        let results = index.search_excluding(&[1.0, 0.0], 5, &exclude).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.source, "DPDP.txt");
    }

    #[tokio::test]
    async fn test_build_replaces_previous_contents() {
        let index = MemoryVectorIndex::new();
        index.build(&[entry("A.txt", 0, vec![1.0])]).await.unwrap();
        index
            .build(&[entry("B.txt", 0, vec![1.0]), entry("B.txt", 1, vec![0.5])])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_build_rejects_mixed_dimensions() {
        let index = MemoryVectorIndex::new();
        let result = index
            .build(&[entry("A.txt", 0, vec![1.0, 0.0]), entry("A.txt", 1, vec![1.0])])
            .await;
        assert!(matches!(result, Err(RagError::Index(_))));
    }

    #[tokio::test]
    async fn test_search_diverse_avoids_near_duplicates() {
        let index = MemoryVectorIndex::new();
        index
            .build(&[
                entry("GDPR.txt", 0, vec![1.0, 0.0, 0.0]),
                entry("GDPR.txt", 1, vec![0.99, 0.01, 0.0]),
                entry("DPDP.txt", 0, vec![0.6, 0.0, 0.8]),
            ])
            .await
            .unwrap();

        let results = index
            .search_diverse(&[1.0, 0.0, 0.0], 2, 3, 0.3)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.source, "GDPR.txt");
        assert_eq!(results[1].chunk.source, "DPDP.txt");
    }
}
