//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 청크와 질문을 같은 프로바이더로 벡터화해야 검색 점수가 의미를 가집니다.
//! (빌드 시점과 질의 시점 모두 같은 모델 사용)
//!
//! - `OllamaEmbedding`: 로컬 Ollama 서버 (`/api/embeddings`, all-minilm)
//! - `HashEmbedding`: 네트워크 없이 동작하는 결정적 해시 임베딩
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config.embedding)?;
//! let embedding = embedder.embed("What is a data fiduciary?").await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 고정 차원 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름 (매니페스트에 기록)
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// 연결 실패 / 5xx 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 500;

/// Ollama 임베딩 구현체
///
/// ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings
#[derive(Debug)]
pub struct OllamaEmbedding {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    name: String,
    dimension: usize,
    max_retries: u32,
    initial_backoff: Duration,
    /// 요청당 타임아웃 (없으면 제한 없음)
    timeout: Option<Duration>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Ollama 에러 응답
#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

/// 한 번의 시도 결과
enum Attempt {
    Done(Vec<f32>),
    /// 재시도 가능 (연결 실패, 5xx)
    Retry(anyhow::Error),
}

impl OllamaEmbedding {
    /// 새 Ollama 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `base_url` - Ollama 서버 주소 (예: `http://localhost:11434`)
    /// * `model` - 임베딩 모델 이름
    /// * `dimension` - 모델 출력 차원
    pub fn new(base_url: &str, model: &str, dimension: usize) -> Result<Self> {
        Self::build(base_url, model, dimension).map_err(RagError::embedding)
    }

    fn build(base_url: &str, model: &str, dimension: usize) -> AnyResult<Self> {
        let endpoint = Url::parse(base_url)
            .and_then(|u| u.join("/api/embeddings"))
            .with_context(|| format!("Invalid Ollama URL: {}", base_url))?;

        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
            name: format!("ollama/{}", model),
            dimension,
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            timeout: None,
        })
    }

    /// 요청당 타임아웃 설정 (만료는 연결 실패와 같이 재시도)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 재시도 정책 변경
    pub fn with_retry(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    async fn attempt(&self, text: &str) -> AnyResult<Attempt> {
        let request = EmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                return Ok(Attempt::Retry(
                    anyhow::Error::new(e).context("Failed to send embedding request"),
                ))
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if status.is_success() {
            let parsed: EmbedResponse =
                serde_json::from_str(&body).context("Failed to parse embedding response")?;
            return Ok(Attempt::Done(parsed.embedding));
        }

        let message = serde_json::from_str::<OllamaError>(&body)
            .map(|e| e.error)
            .unwrap_or(body);

        if status.is_server_error() {
            return Ok(Attempt::Retry(anyhow::anyhow!(
                "Ollama error ({}): {}",
                status,
                message
            )));
        }

        // 4xx (모델 없음 등) - 즉시 실패
        anyhow::bail!("Ollama error ({}): {}", status, message)
    }

    async fn embed_with_retry(&self, text: &str) -> AnyResult<Vec<f32>> {
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=self.max_retries {
            match self.attempt(text).await? {
                Attempt::Done(embedding) => {
                    if embedding.len() != self.dimension {
                        anyhow::bail!(
                            "Model {} returned {} dimensions, expected {}",
                            self.model,
                            embedding.len(),
                            self.dimension
                        );
                    }
                    return Ok(embedding);
                }
                Attempt::Retry(e) => {
                    if attempt < self.max_retries {
                        let backoff = self.initial_backoff * 2u32.pow(attempt);
                        tracing::warn!(
                            "Embedding request failed: {:#}. Retrying in {:?} (attempt {}/{})",
                            e,
                            backoff,
                            attempt + 1,
                            self.max_retries
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("Embedding failed after {} retries", self.max_retries)
        }))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_retry(text)
            .await
            .map_err(RagError::embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding batch {}/{}", i + 1, texts.len());
            results.push(self.embed(text).await?);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Hash Embedding
// ============================================================================

/// 결정적 해시 임베딩 (feature hashing)
///
/// 소문자 단어마다 SHA-256 으로 버킷과 부호를 정하고 L2 정규화합니다.
/// 같은 단어를 공유하는 텍스트끼리 코사인 유사도가 높아집니다.
/// 오프라인 ingest/테스트용이며 의미적 유사도는 반영하지 않습니다.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingProviderKind::Ollama => {
            let mut embedder =
                OllamaEmbedding::new(&config.base_url, &config.model, config.dimension)?;
            if let Some(secs) = config.timeout_secs {
                embedder = embedder.with_timeout(Duration::from_secs(secs));
            }
            Arc::new(embedder)
        }
        EmbeddingProviderKind::Hash => Arc::new(HashEmbedding::new(config.dimension)),
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================
