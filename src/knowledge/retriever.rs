//! Retriever - 다양성 + 다중 출처 보장 검색
//!
//! 1. 질문 임베딩 (ingest 와 같은 임베딩 모델)
//! 2. MMR 다양성 검색 (k, fetch_k, diversity_weight)
//! 3. 출처가 `min_sources` 보다 적으면 보조 유사도 검색 1회
//!    (이미 나온 출처는 제외하고 검색 후 뒤에 덧붙임)
//!
//! 비교 질문이 한 법령의 본문만으로 답변되는 것을 막기 위한 정책입니다.
//! 출처가 하나뿐인 코퍼스에서는 보조 검색이 아무것도 추가하지 못하고 끝납니다.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::vector::{RetrievedChunk, VectorIndex};
use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// 검색 결과
#[derive(Debug, Clone)]
pub struct Retrieval {
    /// 순위 순서 (보조 검색 결과는 뒤에 붙음)
    pub chunks: Vec<RetrievedChunk>,
    /// 최종 출처 집합
    pub sources: BTreeSet<String>,
    /// 보조 검색이 실행되었는지
    pub expanded: bool,
}

/// 청크들의 서로 다른 출처
pub fn distinct_sources(chunks: &[RetrievedChunk]) -> BTreeSet<String> {
    chunks.iter().map(|c| c.chunk.source.clone()).collect()
}

/// 검색기
///
/// 임베딩/인덱스는 프로세스 시작 시 생성해 주입합니다.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// 질문에 대한 청크 검색
    pub async fn retrieve(&self, question: &str) -> Result<Retrieval> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyInput);
        }

        let query = self.embedder.embed(question).await?;
        self.retrieve_with_vector(&query).await
    }

    /// 임베딩된 질의 벡터로 검색
    pub async fn retrieve_with_vector(&self, query: &[f32]) -> Result<Retrieval> {
        let cfg = &self.config;

        let mut chunks = self
            .index
            .search_diverse(query, cfg.retrieval_k, cfg.fetch_k, cfg.diversity_weight)
            .await?;
        let mut sources = distinct_sources(&chunks);

        tracing::debug!(
            "Diverse search returned {} chunks from {} sources",
            chunks.len(),
            sources.len()
        );

        let mut expanded = false;
        if sources.len() < cfg.min_sources {
            expanded = true;

            let extra = self
                .index
                .search_excluding(query, cfg.fallback_k, &sources)
                .await?;

            let mut added = 0;
            for candidate in extra {
                if chunks
                    .iter()
                    .any(|c| c.chunk.same_position(&candidate.chunk))
                {
                    continue;
                }
                chunks.push(candidate);
                added += 1;
            }
            sources = distinct_sources(&chunks);

            if sources.len() < cfg.min_sources {
                tracing::warn!(
                    "Only {} source(s) available after supplementary search",
                    sources.len()
                );
            } else {
                tracing::info!(
                    "Supplementary search added {} chunks; sources: {:?}",
                    added,
                    sources
                );
            }
        }

        Ok(Retrieval {
            chunks,
            sources,
            expanded,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use crate::knowledge::{Candidate, Chunk, IndexEntry, MemoryVectorIndex};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 항상 같은 벡터를 반환하는 임베딩
    struct FixedEmbedding {
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector.clone())
        }

        fn dimension(&self) -> usize {
            self.vector.len()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// 검색 호출 수를 세는 인덱스
    #[derive(Default)]
    struct CountingIndex {
        inner: MemoryVectorIndex,
        excluding_calls: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for CountingIndex {
        async fn build(&self, entries: &[IndexEntry]) -> Result<usize> {
            self.inner.build(entries).await
        }

        async fn search_excluding(
            &self,
            query: &[f32],
            k: usize,
            exclude_sources: &BTreeSet<String>,
        ) -> Result<Vec<RetrievedChunk>> {
            self.excluding_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.search_excluding(query, k, exclude_sources).await
        }

        async fn fetch_candidates(
            &self,
            query: &[f32],
            fetch_k: usize,
        ) -> Result<Vec<Candidate>> {
            self.inner.fetch_candidates(query, fetch_k).await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }
    }

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

    fn config(k: usize, fetch_k: usize, weight: f32) -> RetrievalConfig {
        RetrievalConfig {
            retrieval_k: k,
            fetch_k,
            diversity_weight: weight,
            ..RetrievalConfig::default()
        }
    }

    fn fixed(vector: Vec<f32>) -> Arc<FixedEmbedding> {
        Arc::new(FixedEmbedding {
            vector,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_supplementary_search_adds_second_source() {
        let index = Arc::new(CountingIndex::default());
        index
            .build(&[
                entry("GDPR.txt", 0, vec![1.0, 0.0]),
                entry("GDPR.txt", 1, vec![0.99, 0.01]),
                entry("GDPR.txt", 2, vec![0.98, 0.02]),
                entry("DPDP.txt", 0, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        // λ = 1.0: 관련성만 -> 상위 2개 모두 GDPR
        let retriever = Retriever::new(fixed(vec![1.0, 0.0]), index.clone(), config(2, 3, 1.0));
        let retrieval = retriever.retrieve("Compare GDPR and DPDP").await.unwrap();

        assert!(retrieval.expanded);
        assert_eq!(
            retrieval.sources.iter().cloned().collect::<Vec<_>>(),
            vec!["DPDP.txt", "GDPR.txt"]
        );
        // 보조 결과는 뒤에 붙음
        assert_eq!(retrieval.chunks[0].chunk.source, "GDPR.txt");
        assert_eq!(retrieval.chunks.last().unwrap().chunk.source, "DPDP.txt");
        assert_eq!(index.excluding_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_supplementary_search_when_covered() {
        let index = Arc::new(CountingIndex::default());
        index
            .build(&[
                entry("GDPR.txt", 0, vec![1.0, 0.0]),
                entry("DPDP.txt", 0, vec![0.9, 0.1]),
            ])
            .await
            .unwrap();

        let retriever = Retriever::new(fixed(vec![1.0, 0.0]), index.clone(), config(2, 2, 0.7));
        let retrieval = retriever.retrieve("consent").await.unwrap();

        assert!(!retrieval.expanded);
        assert_eq!(retrieval.sources.len(), 2);
        assert_eq!(index.excluding_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_source_corpus_runs_one_pass() {
        let index = Arc::new(CountingIndex::default());
        index
            .build(&[
                entry("GDPR.txt", 0, vec![1.0, 0.0]),
                entry("GDPR.txt", 1, vec![0.5, 0.5]),
            ])
            .await
            .unwrap();

        let retriever = Retriever::new(fixed(vec![1.0, 0.0]), index.clone(), config(2, 4, 0.7));
        let retrieval = retriever.retrieve("anything").await.unwrap();

        assert!(retrieval.expanded);
        assert_eq!(retrieval.sources.len(), 1);
        assert_eq!(retrieval.chunks.len(), 2);
        assert_eq!(index.excluding_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_question_skips_embedding() {
        let embedder = fixed(vec![1.0]);
        let index = Arc::new(CountingIndex::default());
        let retriever = Retriever::new(embedder.clone(), index, RetrievalConfig::default());

        assert!(matches!(
            retriever.retrieve("   \n").await,
            Err(RagError::EmptyInput)
        ));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_two_document_scenario() {
        let embedder = Arc::new(HashEmbedding::new(64));
        let index = Arc::new(MemoryVectorIndex::new());

        let mut entries = Vec::new();
        for (source, text) in [("A.txt", "A says X."), ("B.txt", "B says Y.")] {
            entries.push(IndexEntry {
                chunk: Chunk {
                    source: source.to_string(),
                    page: None,
                    index: 0,
                    text: text.to_string(),
                },
                embedding: embedder.embed(text).await.unwrap(),
            });
        }
        index.build(&entries).await.unwrap();

        let retriever = Retriever::new(embedder, index, config(2, 30, 0.7));
        let retrieval = retriever.retrieve("Compare A and B").await.unwrap();

        assert!(retrieval.sources.contains("A.txt"));
        assert!(retrieval.sources.contains("B.txt"));
    }

    #[test]
    fn test_distinct_sources() {
        let chunks: Vec<RetrievedChunk> = ["B.txt", "A.txt", "B.txt"]
            .iter()
            .enumerate()
            .map(|(i, s)| RetrievedChunk {
                chunk: entry(s, i, vec![]).chunk,
                score: 0.0,
            })
            .collect();
        let sources = distinct_sources(&chunks);
        assert_eq!(sources.into_iter().collect::<Vec<_>>(), vec!["A.txt", "B.txt"]);
    }
}
