//! 파일 수집 모듈
//!
//! 입력 디렉토리에서 지원하는 문서 파일(.pdf / .txt)을 찾습니다.
//! 하위 디렉토리는 내려가지 않고, 숨김 파일은 건너뜁니다.
//! ingest 순서가 항상 같도록 파일 이름 순으로 정렬합니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 일반 텍스트 (UTF-8)
    Text,
    /// PDF 파일
    Pdf,
}

impl FileType {
    /// 확장자로 파일 타입 결정 (대소문자 무시)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" => Some(FileType::Text),
            "pdf" => Some(FileType::Pdf),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    pub path: PathBuf,
    /// 출처 식별자 (파일 이름)
    pub source: String,
    pub file_type: FileType,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedFile {
    /// 지원하는 파일이면 CollectedFile 생성
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        let file_type = match FileType::from_path(&path) {
            Some(ft) => ft,
            None => return Ok(None), // 지원하지 않는 확장자
        };

        let source = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Ok(None),
        };

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            source,
            file_type,
            size: metadata.len(),
        }))
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 디렉토리의 문서 파일 수집 (비재귀)
pub fn collect_directory(path: &Path) -> Result<Vec<CollectedFile>> {
    if !path.exists() {
        anyhow::bail!("Directory not found: {:?}", path);
    }

    if !path.is_dir() {
        anyhow::bail!("Not a directory: {:?}", path);
    }

    let mut files = Vec::new();

    // 입력 디렉토리는 문서 폴더이므로 .gitignore 규칙은 적용하지 않음
    let walker = WalkBuilder::new(path)
        .max_depth(Some(1))
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Failed to read entry: {}", e);
                continue;
            }
        };

        // 파일만 처리
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        match CollectedFile::from_path(entry.path().to_path_buf()) {
            Ok(Some(file)) => files.push(file),
            Ok(None) => {
                tracing::debug!("Skipping unsupported file: {:?}", entry.path());
            }
            Err(e) => {
                tracing::warn!("Failed to collect file: {:#}", e);
            }
        }
    }

    files.sort_by(|a, b| a.source.cmp(&b.source));

    tracing::info!("Collected {} files from {:?}", files.len(), path);
    Ok(files)
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub text_files: usize,
    pub pdf_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    /// 수집된 파일 목록에서 통계 계산
    pub fn from_files(files: &[CollectedFile]) -> Self {
        let mut stats = Self::default();

        for file in files {
            stats.total_files += 1;
            stats.total_size += file.size;

            match file.file_type {
                FileType::Text => stats.text_files += 1,
                FileType::Pdf => stats.pdf_files += 1,
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================
