//! Text Chunking Module
//!
//! 정규화된 문서 텍스트를 겹치는(overlap) 청크로 분할합니다.
//! 가장 굵은 경계(문단)부터 시도하고, 청크가 너무 길 때만
//! 더 세밀한 경계(줄, 문장 부호, 공백, 문자)로 내려갑니다.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{Chunk, Document};

/// 분할 경계 우선순위 (굵은 것 -> 세밀한 것)
///
/// 마지막 빈 문자열은 문자 단위 분할로, 경계가 전혀 없는 긴 구간에서도
/// 최대 길이를 넘지 않게 합니다.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ".", "!", "?", " ", ""];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정 (길이 단위: 문자)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkConfig {
    /// 최대 청크 크기
    pub chunk_size: usize,
    /// 연속 청크 간 오버랩 크기 (chunk_size 미만)
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 250,
        }
    }
}

impl ChunkConfig {
    /// 오버랩 없는 설정
    pub fn without_overlap(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap: 0,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크 문자열로 분할
    fn split(&self, text: &str) -> Vec<String>;

    /// 문서를 청크로 분할 (출처/페이지 상속)
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split(&document.text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                source: document.source.clone(),
                page: document.page,
                index,
                text,
            })
            .collect()
    }

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀 경계 청커
///
/// 1. 텍스트에 존재하는 가장 굵은 경계로 조각을 나눔 (경계 문자는 앞 조각에 붙임)
/// 2. `chunk_size` 미만 조각은 순서대로 병합
/// 3. 너무 긴 조각은 다음 경계로 재귀 분할
/// 4. 청크를 내보낼 때 앞쪽 조각을 버려 `chunk_overlap` 이하의 꼬리만
///    다음 청크의 시작으로 남김
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    config: ChunkConfig,
    separators: Vec<&'static str>,
}

impl RecursiveChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            separators: DEFAULT_SEPARATORS.to_vec(),
        }
    }

    fn split_recursive(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        // 텍스트에 존재하는 첫 번째 경계 선택
        let mut separator = "";
        let mut remaining: &[&'static str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let pieces = split_keeping_separator(text, separator);

        let mut chunks = Vec::new();
        let mut short: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.config.chunk_size {
                short.push(piece);
                continue;
            }

            if !short.is_empty() {
                chunks.extend(self.merge_pieces(&short));
                short.clear();
            }

            if remaining.is_empty() {
                // 문자 단위까지 내려왔는데도 chunk_size 이상 (chunk_size == 1)
                let piece = piece.trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !short.is_empty() {
            chunks.extend(self.merge_pieces(&short));
        }

        chunks
    }

    /// 짧은 조각들을 chunk_size 이하 청크로 병합 (오버랩 포함)
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.config.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window);

                // 오버랩만 남기고 앞쪽 조각 제거
                while total > self.config.chunk_overlap
                    || (total + len > self.config.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        push_trimmed(&mut chunks, &window);
        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() || self.config.chunk_size == 0 {
            return vec![];
        }

        self.split_recursive(text, &self.separators)
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문자 수 (바이트 아님)
#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_trimmed(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// 경계 문자를 앞 조각에 붙여서 분할. 빈 경계는 문자 단위 분할
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    text.split_inclusive(separator)
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 설정을 지정한 청커 생성
pub fn recursive_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================
