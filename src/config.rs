//! 설정 모듈
//!
//! TOML 파일(선택) + 환경변수 + CLI 플래그 순으로 설정을 구성합니다.
//!
//! 우선순위 (높은 순):
//! 1. CLI 플래그
//! 2. `OLLAMA_HOST` 환경변수 (base_url)
//! 3. `--config` 로 지정한 파일, 없으면 `./compliance-rag.toml`
//! 4. 기본값

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RagError, Result};
use crate::knowledge::{get_data_dir, ChunkConfig};

/// 작업 디렉토리에서 자동으로 읽는 설정 파일 이름
pub const DEFAULT_CONFIG_FILE: &str = "compliance-rag.toml";

/// 기본 Ollama 주소
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

// ============================================================================
// Config Types
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// ingest 입력 디렉토리 (.pdf / .txt)
    pub data_dir: PathBuf,
    /// 벡터 인덱스 디렉토리
    pub index_dir: PathBuf,
    pub chunking: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub prompt: PromptConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            index_dir: get_data_dir().join("index"),
            chunking: ChunkConfig::default(),
            retrieval: RetrievalConfig::default(),
            prompt: PromptConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

/// 검색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 최종 반환 청크 수 (k)
    pub retrieval_k: usize,
    /// MMR 후보 풀 크기 (fetch_k >= k)
    pub fetch_k: usize,
    /// 1.0 = 관련성만, 0.0 = 다양성만
    pub diversity_weight: f32,
    /// 보장할 최소 출처 수
    pub min_sources: usize,
    /// 보조 유사도 검색 크기
    pub fallback_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            retrieval_k: 10,
            fetch_k: 30,
            diversity_weight: 0.7,
            min_sources: 2,
            fallback_k: 5,
        }
    }
}

/// 프롬프트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// 청크당 프롬프트에 넣을 최대 문자 수
    pub context_preview_length: usize,
    /// 프롬프트에 넣을 최대 청크 수
    pub max_context_chunks: usize,
    /// 페르소나 문구 (없으면 기본값)
    pub preamble: Option<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            context_preview_length: 800,
            max_context_chunks: 6,
            preamble: None,
        }
    }
}

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Ollama 서버 (all-minilm 등)
    Ollama,
    /// 결정적 해시 임베딩 (오프라인)
    Hash,
}

/// 임베딩 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub dimension: usize,
    pub base_url: String,
    /// 요청당 HTTP 타임아웃 (초). 없으면 제한 없음
    pub timeout_secs: Option<u64>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Ollama,
            // all-MiniLM-L6-v2
            model: "all-minilm".to_string(),
            dimension: 384,
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            timeout_secs: None,
        }
    }
}

/// 언어 모델 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub model_temperature: f32,
    pub base_url: String,
    /// HTTP 타임아웃 (초). 없으면 제한 없음
    pub timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "phi3:mini".to_string(),
            model_temperature: 0.3,
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            timeout_secs: None,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl RagConfig {
    /// 설정 로드
    ///
    /// `path` 가 주어지면 반드시 읽어야 하고, 없으면 작업 디렉토리의
    /// `compliance-rag.toml` 을 (존재할 때만) 읽습니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_in(path, Path::new("."))
    }

    /// `work_dir` 기준으로 설정 로드
    fn load_in(path: Option<&Path>, work_dir: &Path) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = work_dir.join(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_ollama_host(std::env::var("OLLAMA_HOST").ok());
        Ok(config)
    }

    /// TOML 파일에서 읽기
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))
            .map_err(|e| RagError::Config(format!("{:#}", e)))?;

        Self::from_toml(&raw)
            .map_err(|e| RagError::Config(format!("{}: {}", path.display(), e)))
    }

    /// TOML 문자열 파싱
    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// `OLLAMA_HOST` 값 반영 (스킴이 없으면 `http://`)
    fn apply_ollama_host(&mut self, host: Option<String>) {
        if let Some(host) = host {
            if !host.is_empty() {
                let host = if host.starts_with("http://") || host.starts_with("https://") {
                    host
                } else {
                    format!("http://{}", host)
                };
                tracing::debug!("Using Ollama host from OLLAMA_HOST: {}", host);
                self.embedding.base_url = host.clone();
                self.llm.base_url = host;
            }
        }
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than 0".into()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }

        let r = &self.retrieval;
        if r.retrieval_k == 0 {
            return Err(RagError::Config("retrieval_k must be greater than 0".into()));
        }
        if r.fetch_k < r.retrieval_k {
            return Err(RagError::Config(format!(
                "fetch_k ({}) must be >= retrieval_k ({})",
                r.fetch_k, r.retrieval_k
            )));
        }
        check_unit_range("diversity_weight", r.diversity_weight)?;
        check_unit_range("model_temperature", self.llm.model_temperature)?;

        if r.fallback_k == 0 {
            return Err(RagError::Config("fallback_k must be greater than 0".into()));
        }

        if self.prompt.context_preview_length == 0 {
            return Err(RagError::Config(
                "context_preview_length must be greater than 0".into(),
            ));
        }
        if self.prompt.max_context_chunks == 0 {
            return Err(RagError::Config(
                "max_context_chunks must be greater than 0".into(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Config("embedding dimension must be greater than 0".into()));
        }

        check_url("embedding.base_url", &self.embedding.base_url)?;
        check_url("llm.base_url", &self.llm.base_url)?;

        Ok(())
    }
}

fn check_unit_range(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(RagError::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_url(name: &str, value: &str) -> Result<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| RagError::Config(format!("{} is not a valid URL ({}): {}", name, value, e)))
}

// ============================================================================
// Tests
// ============================================================================
