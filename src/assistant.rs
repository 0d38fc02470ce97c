//! Compliance Assistant - 질의 파이프라인
//!
//! Question -> Retriever -> Prompt Composer -> Answer Generator -> Answer
//!
//! 모든 구성 요소는 프로세스 시작 시 한 번 만들어 주입합니다.
//! 한 질문은 처음부터 끝까지 순서대로 처리되며, 실패하면 해당 질문만 중단됩니다.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{RagError, Result};
use crate::generation::{AnswerGenerator, PromptComposer};
use crate::knowledge::{Retriever, RetrievedChunk};

/// 답변
#[derive(Debug, Clone)]
pub struct Answer {
    pub question: String,
    /// 모델 출력 (구조화된 Markdown)
    pub text: String,
    /// 검색된 출처 전체
    pub sources: BTreeSet<String>,
    /// 프롬프트에 들어간 청크 (검색 순서)
    pub context: Vec<RetrievedChunk>,
    /// 검색 결과 전체
    pub retrieved: Vec<RetrievedChunk>,
}

impl Answer {
    /// 답변 + 출처 목록
    pub fn render(&self) -> String {
        format!(
            "{}\n\nSources used: {}",
            self.text.trim_end(),
            self.sources.iter().cloned().collect::<Vec<_>>().join(", ")
        )
    }
}

/// 질의 응답기
pub struct ComplianceAssistant {
    retriever: Retriever,
    composer: PromptComposer,
    generator: Arc<dyn AnswerGenerator>,
}

impl ComplianceAssistant {
    pub fn new(
        retriever: Retriever,
        composer: PromptComposer,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            retriever,
            composer,
            generator,
        }
    }

    /// 질문에 답변
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyInput);
        }

        let retrieval = self.retriever.retrieve(question).await?;

        let selected = self.composer.select_context(&retrieval.chunks);
        let prompt = self.composer.compose_selected(question, &selected);
        let context: Vec<RetrievedChunk> = selected.into_iter().cloned().collect();

        tracing::debug!(
            "Prompt: {} chars, {} context chunks",
            prompt.chars().count(),
            context.len()
        );

        let text = self.generator.generate(&prompt).await?;

        Ok(Answer {
            question: question.to_string(),
            text,
            sources: retrieval.sources,
            context,
            retrieved: retrieval.chunks,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
