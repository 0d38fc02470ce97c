//! 에러 타입
//!
//! 파이프라인 단계별 에러 분류입니다.
//! - ingest 단계: 파일 단위 `Load` 에러는 격리 (해당 파일만 건너뜀)
//! - query 단계: 모든 에러는 해당 질의를 중단하고 호출자에게 반환

use thiserror::Error;

/// 결과 타입 별칭
pub type Result<T> = std::result::Result<T, RagError>;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 파일을 읽거나 파싱할 수 없음 (ingest 시 건너뜀)
    #[error("Failed to load '{source_id}': {message}")]
    Load { source_id: String, message: String },

    /// 임베딩 호출 실패 (ingest/query 중단)
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// 벡터 인덱스를 읽을 수 없거나 손상됨
    #[error("Vector index error: {0}")]
    Index(String),

    /// 언어 모델 호출 실패 또는 타임아웃 (재시도하지 않음)
    #[error("Answer generation failed: {0}")]
    Generation(String),

    /// 빈 질문
    #[error("Question is empty")]
    EmptyInput,

    /// 잘못된 설정
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RagError {
    /// 로드 에러 생성
    pub fn load(source_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Load {
            source_id: source_id.into(),
            message: message.to_string(),
        }
    }

    /// 임베딩 에러 생성 (anyhow 체인 포함)
    pub fn embedding(err: impl std::fmt::Display) -> Self {
        Self::Embedding(format!("{:#}", err))
    }

    /// 인덱스 에러 생성
    pub fn index(err: impl std::fmt::Display) -> Self {
        Self::Index(format!("{:#}", err))
    }

    /// 생성 에러 생성
    pub fn generation(err: impl std::fmt::Display) -> Self {
        Self::Generation(format!("{:#}", err))
    }

    /// ingest 를 다시 실행해야 하는 에러인지
    pub fn requires_reingest(&self) -> bool {
        matches!(self, Self::Index(_))
    }
}

// ============================================================================
// Tests
// ============================================================================
