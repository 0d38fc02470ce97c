//! Knowledge 모듈 - 검색 파이프라인 핵심
//!
//! - Normalizer: 추출 텍스트 정리
//! - Chunker: 경계 우선순위 기반 재귀 분할
//! - Vector: 인덱스 트레이트 + 메모리 구현
//! - MMR: 다양성 인식 재순위화
//! - Lance: LanceDB 영속 인덱스
//! - Ingest / Retriever: 빌드 시점 / 질의 시점 파이프라인

mod chunker;
mod ingest;
mod lance;
mod manifest;
mod mmr;
mod normalizer;
mod retriever;
mod vector;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// Re-exports
pub use chunker::{
    recursive_chunker, ChunkConfig, Chunker, RecursiveChunker, DEFAULT_SEPARATORS,
};
pub use ingest::{IngestReport, IngestedFile, Ingestor, SkippedFile};
pub use lance::LanceVectorIndex;
pub use manifest::{IndexManifest, MANIFEST_FILE};
pub use mmr::{mmr_select, MmrCandidate};
pub use normalizer::normalize;
pub use retriever::{distinct_sources, Retrieval, Retriever};
pub use vector::{
    cosine_similarity, Candidate, IndexEntry, MemoryVectorIndex, RetrievedChunk, VectorIndex,
};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.local/share/compliance-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("compliance-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 로드된 문서 (불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// 출처 식별자 (파일 이름)
    pub source: String,
    /// PDF 페이지 번호 (1부터)
    pub page: Option<u32>,
    /// 원문 텍스트
    pub text: String,
}

impl Document {
    /// 텍스트 문서 생성
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page: None,
            text: text.into(),
        }
    }

    /// 정규화된 사본
    pub fn normalized(&self) -> Self {
        Self {
            source: self.source.clone(),
            page: self.page,
            text: normalize(&self.text),
        }
    }
}

/// 임베딩/저장/검색 단위
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// 부모 문서의 출처 식별자
    pub source: String,
    /// 부모 문서의 페이지
    pub page: Option<u32>,
    /// 문서 내 순서 (0부터)
    pub index: usize,
    pub text: String,
}

impl Chunk {
    /// 같은 청크인지 (출처, 페이지, 순서 기준)
    pub fn same_position(&self, other: &Chunk) -> bool {
        self.source == other.source && self.page == other.page && self.index == other.index
    }

    /// 사람이 읽는 위치 표시 (예: `GDPR.pdf p.3 #2`)
    pub fn location(&self) -> String {
        match self.page {
            Some(page) => format!("{} p.{} #{}", self.source, page, self.index),
            None => format!("{} #{}", self.source, self.index),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
