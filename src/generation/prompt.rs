//! Prompt Composer
//!
//! 검색된 청크로 단일 프롬프트를 만듭니다.
//! - 페르소나: 제공된 컨텍스트만 사용하도록 제한
//! - 컨텍스트: `From {source}:` + 청크 앞부분 (context_preview_length 문자)
//! - 질문 원문
//! - 고정 출력 구조 (Overview / 출처별 Highlights / Similarities / Differences / Summary)
//!
//! 청크 잘라내기는 토큰 예산 제어용입니다. 인덱스에는 전체 청크가 저장됩니다.

use std::collections::HashSet;
use std::path::Path;

use crate::config::PromptConfig;
use crate::knowledge::RetrievedChunk;

/// 기본 페르소나
pub const DEFAULT_PREAMBLE: &str = "You are a senior legal policy analyst specializing in data protection and AI ethics.
Use only the provided context from GDPR, DPDP, and AI Ethics guidelines to answer the user's question.
If a source does not specify something, say so instead of guessing.

Present the answer in a structured, professional format using Markdown headings and bullet points.";

/// 프롬프트 작성기
#[derive(Debug, Clone, Default)]
pub struct PromptComposer {
    config: PromptConfig,
}

impl PromptComposer {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    /// 프롬프트에 넣을 청크 선택
    ///
    /// 최대 `max_context_chunks` 개. 출처마다 가장 순위가 높은 청크 하나씩을 먼저
    /// 확보한 뒤 남은 자리를 순위대로 채웁니다. 결과는 검색 순서를 유지합니다.
    pub fn select_context<'a>(&self, chunks: &'a [RetrievedChunk]) -> Vec<&'a RetrievedChunk> {
        let limit = self.config.max_context_chunks;
        if chunks.len() <= limit {
            return chunks.iter().collect();
        }

        let mut picked = vec![false; chunks.len()];
        let mut remaining = limit;

        // 1. 출처별 대표 청크
        let mut seen_sources: HashSet<&str> = HashSet::new();
        for (i, c) in chunks.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            if seen_sources.insert(c.chunk.source.as_str()) {
                picked[i] = true;
                remaining -= 1;
            }
        }

        // 2. 남은 자리는 순위대로
        for flag in picked.iter_mut() {
            if remaining == 0 {
                break;
            }
            if !*flag {
                *flag = true;
                remaining -= 1;
            }
        }

        chunks
            .iter()
            .zip(picked)
            .filter_map(|(c, keep)| keep.then_some(c))
            .collect()
    }

    /// 컨텍스트 블록 (`From {source}:\n{preview}`, 빈 줄로 구분)
    pub fn context_text(&self, chunks: &[&RetrievedChunk]) -> String {
        chunks
            .iter()
            .map(|c| {
                format!(
                    "From {}:\n{}",
                    c.chunk.source,
                    preview(&c.chunk.text, self.config.context_preview_length)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// 전체 프롬프트 작성
    pub fn compose(&self, question: &str, chunks: &[RetrievedChunk]) -> String {
        let selected = self.select_context(chunks);
        self.compose_selected(question, &selected)
    }

    /// 이미 선택된 청크로 프롬프트 작성
    pub fn compose_selected(&self, question: &str, selected: &[&RetrievedChunk]) -> String {
        let preamble = self
            .config
            .preamble
            .as_deref()
            .unwrap_or(DEFAULT_PREAMBLE);

        format!(
            "{preamble}\n\nContext from documents:\n{context}\n\nQuestion:\n{question}\n\nOutput Format:\n{format}\n",
            preamble = preamble.trim(),
            context = self.context_text(selected),
            question = question.trim(),
            format = output_format(selected),
        )
    }
}

/// 앞에서부터 최대 `max_chars` 문자
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// 출력 구조 제목
///
/// 컨텍스트에 나온 출처마다 `### {이름} Highlights` 하나씩 (처음 나온 순서).
fn output_format(selected: &[&RetrievedChunk]) -> String {
    let mut headings = vec!["### Overview".to_string()];

    let mut seen: HashSet<&str> = HashSet::new();
    for c in selected {
        if seen.insert(c.chunk.source.as_str()) {
            headings.push(format!("### {} Highlights", display_name(&c.chunk.source)));
        }
    }

    headings.push("### Key Similarities".to_string());
    headings.push("### Key Differences".to_string());
    headings.push("### Summary".to_string());
    headings.join("\n")
}

/// 출처 표시 이름 (파일 stem, 예: `GDPR.pdf` -> `GDPR`)
fn display_name(source: &str) -> &str {
    Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(source)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::Chunk;

    fn retrieved(source: &str, index: usize, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                source: source.to_string(),
                page: None,
                index,
                text: text.to_string(),
            },
            score: 1.0,
        }
    }

    fn composer(max_chunks: usize, preview_len: usize) -> PromptComposer {
        PromptComposer::new(PromptConfig {
            context_preview_length: preview_len,
            max_context_chunks: max_chunks,
            preamble: None,
        })
    }

    #[test]
    fn test_preview_counts_chars() {
        assert_eq!(preview("abcdef", 3), "abc");
        assert_eq!(preview("abc", 10), "abc");
        assert_eq!(preview("데이터보호", 2), "데이");
        assert_eq!(preview("abc", 0), "");
    }

    #[test]
    fn test_context_blocks_are_truncated() {
        let chunks = vec![
            retrieved("GDPR.pdf", 0, &"g".repeat(900)),
            retrieved("DPDP.pdf", 0, "short"),
        ];
        let composer = composer(6, 800);
        let selected = composer.select_context(&chunks);
        let context = composer.context_text(&selected);

        let expected = format!("From GDPR.pdf:\n{}\n\nFrom DPDP.pdf:\nshort", "g".repeat(800));
        assert_eq!(context, expected);
    }

    #[test]
    fn test_select_context_reserves_each_source() {
        let mut chunks: Vec<RetrievedChunk> = (0..8)
            .map(|i| retrieved("GDPR.txt", i, "gdpr"))
            .collect();
        chunks.push(retrieved("DPDP.txt", 0, "dpdp"));

        let composer = composer(6, 800);
        let selected = composer.select_context(&chunks);

        assert_eq!(selected.len(), 6);
        assert!(selected.iter().any(|c| c.chunk.source == "DPDP.txt"));
        // 검색 순서 유지: GDPR 0..5 다음 DPDP
        assert_eq!(selected[0].chunk.index, 0);
        assert_eq!(selected[5].chunk.source, "DPDP.txt");
    }

    #[test]
    fn test_select_context_keeps_all_when_under_limit() {
        let chunks = vec![retrieved("A.txt", 0, "a"), retrieved("A.txt", 1, "b")];
        assert_eq!(composer(6, 800).select_context(&chunks).len(), 2);
    }

    #[test]
    fn test_compose_contains_all_parts() {
        let chunks = vec![
            retrieved("GDPR.pdf", 0, "Consent must be freely given."),
            retrieved("DPDP.pdf", 0, "Consent shall be free and specific."),
        ];
        let prompt = composer(6, 800).compose("  Compare consent rules  ", &chunks);

        assert!(prompt.starts_with("You are a senior legal policy analyst"));
        assert!(prompt.contains("Use only the provided context"));
        assert!(prompt.contains("From GDPR.pdf:\nConsent must be freely given."));
        assert!(prompt.contains("Question:\nCompare consent rules\n"));

        let overview = prompt.find("### Overview").unwrap();
        let gdpr = prompt.find("### GDPR Highlights").unwrap();
        let dpdp = prompt.find("### DPDP Highlights").unwrap();
        let similarities = prompt.find("### Key Similarities").unwrap();
        let differences = prompt.find("### Key Differences").unwrap();
        let summary = prompt.find("### Summary").unwrap();
        assert!(overview < gdpr && gdpr < dpdp && dpdp < similarities);
        assert!(similarities < differences && differences < summary);
    }

    #[test]
    fn test_custom_preamble() {
        let composer = PromptComposer::new(PromptConfig {
            preamble: Some("You are a privacy auditor.".to_string()),
            ..PromptConfig::default()
        });
        let prompt = composer.compose("q", &[retrieved("A.txt", 0, "a")]);
        assert!(prompt.starts_with("You are a privacy auditor.\n\n"));
        assert!(!prompt.contains("senior legal policy analyst"));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("GDPR.pdf"), "GDPR");
        assert_eq!(display_name("DPDP_Act_2023.txt"), "DPDP_Act_2023");
        assert_eq!(display_name("noext"), "noext");
    }
}
