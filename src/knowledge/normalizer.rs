//! Text Normalizer
//!
//! PDF/텍스트 추출 결과를 청킹 전에 정리합니다.
//! 문자 오프셋이 바뀌므로 반드시 청킹보다 먼저 실행해야 합니다.
//!
//! 순서:
//! 1. 줄바꿈으로 끊긴 하이픈 단어 연결 (`data-\nbase` -> `database`)
//! 2. 연속 줄바꿈 -> 공백 하나
//! 3. 연속 공백 -> 공백 하나
//! 4. 앞뒤 공백 제거

use std::sync::LazyLock;

use regex::Regex;

static HYPHEN_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\s*\n").expect("Invalid regex"));
static NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n+").expect("Invalid regex"));
static MULTI_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("Invalid regex"));

/// 텍스트 정규화 (멱등)
///
/// `normalize(normalize(t)) == normalize(t)`
pub fn normalize(text: &str) -> String {
    let text = HYPHEN_BREAK.replace_all(text, "");
    let text = NEWLINES.replace_all(&text, " ");
    let text = MULTI_SPACE.replace_all(&text, " ");
    text.trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================
