//! 답변 생성 모듈
//!
//! 프롬프트 하나를 언어 모델에 보내고 텍스트를 받습니다.
//! 실패(연결 실패, 타임아웃, 모델 없음)는 `RagError::Generation` 으로 그대로
//! 호출자에게 전달하며 재시도하지 않습니다.

pub mod prompt;

use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::LlmConfig;
use crate::error::{RagError, Result};

pub use prompt::{preview, PromptComposer, DEFAULT_PREAMBLE};

// ============================================================================
// AnswerGenerator Trait
// ============================================================================

/// 답변 생성기 트레이트
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// 프롬프트 -> 답변 텍스트 (1회 호출)
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Generator
// ============================================================================

/// Ollama `/api/generate` 클라이언트
///
/// ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-completion
#[derive(Debug)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

impl OllamaGenerator {
    /// 설정으로 생성
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Self::build(config).map_err(RagError::generation)
    }

    fn build(config: &LlmConfig) -> AnyResult<Self> {
        let endpoint = Url::parse(&config.base_url)
            .and_then(|u| u.join("/api/generate"))
            .with_context(|| format!("Invalid Ollama URL: {}", config.base_url))?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            temperature: config.model_temperature,
        })
    }

    async fn request(&self, prompt: &str) -> AnyResult<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", self.endpoint))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            let message = serde_json::from_str::<OllamaError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("Ollama error ({}): {}", status, message);
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse generate response")?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        tracing::info!("Generating answer with model: {}", self.model);

        let answer = self.request(prompt).await.map_err(RagError::generation)?;

        tracing::debug!("Generated {} chars", answer.chars().count());
        Ok(answer)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
