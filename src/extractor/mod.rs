//! 문서 로더
//!
//! 수집된 파일에서 `Document` 를 만듭니다.
//! - 텍스트 파일: UTF-8 로 직접 읽기 (문서 1개)
//! - PDF 파일: pdf-extract 로 페이지별 추출 (페이지당 문서 1개)
//!
//! 파일 단위 실패는 `RagError::Load` 로 모아 두고 나머지 파일은 계속 읽습니다.

pub mod pdf;

use std::path::Path;

use crate::collector::{collect_directory, CollectedFile, FileType};
use crate::error::{RagError, Result};
use crate::knowledge::Document;

// ============================================================================
// Load Outcome
// ============================================================================

/// 파일 하나에서 읽은 문서들
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub source: String,
    pub file_type: FileType,
    pub documents: Vec<Document>,
}

/// 디렉토리 로드 결과
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// 파일 이름 순
    pub files: Vec<LoadedFile>,
    /// 건너뛴 파일 (`RagError::Load`)
    pub failures: Vec<RagError>,
}

// ============================================================================
// Document Loader
// ============================================================================

/// 문서 로더
#[derive(Debug, Default, Clone)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// 디렉토리의 .pdf / .txt 파일 로드
    ///
    /// 디렉토리 자체를 읽을 수 없으면 에러, 개별 파일 실패는 `failures` 에 기록합니다.
    pub async fn load_dir(&self, dir: &Path) -> Result<LoadOutcome> {
        let files = collect_directory(dir)
            .map_err(|e| RagError::load(dir.display().to_string(), format!("{:#}", e)))?;

        let mut outcome = LoadOutcome::default();

        for file in &files {
            match self.load_file(file).await {
                Ok(documents) => {
                    tracing::info!(
                        "Loaded {} ({} document{})",
                        file.source,
                        documents.len(),
                        if documents.len() == 1 { "" } else { "s" }
                    );
                    outcome.files.push(LoadedFile {
                        source: file.source.clone(),
                        file_type: file.file_type,
                        documents,
                    });
                }
                Err(e) => {
                    tracing::warn!("Skipping file: {}", e);
                    outcome.failures.push(e);
                }
            }
        }

        Ok(outcome)
    }

    /// 파일 하나 로드
    pub async fn load_file(&self, file: &CollectedFile) -> Result<Vec<Document>> {
        match file.file_type {
            FileType::Text => self.load_text(file).await,
            FileType::Pdf => self.load_pdf(file).await,
        }
    }

    async fn load_text(&self, file: &CollectedFile) -> Result<Vec<Document>> {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| RagError::load(&file.source, e))?;

        let text = String::from_utf8(bytes)
            .map_err(|e| RagError::load(&file.source, format!("not valid UTF-8: {}", e)))?;

        Ok(vec![Document::new(file.source.clone(), text)])
    }

    async fn load_pdf(&self, file: &CollectedFile) -> Result<Vec<Document>> {
        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        // (pdf-extract 의 panic 도 JoinError 로 잡힘)
        let path = file.path.clone();
        let pages = tokio::task::spawn_blocking(move || pdf::extract_pages(&path))
            .await
            .map_err(|e| RagError::load(&file.source, format!("PDF parser crashed: {}", e)))?
            .map_err(|e| RagError::load(&file.source, format!("{:#}", e)))?;

        Ok(pages
            .into_iter()
            .map(|(page, text)| Document {
                source: file.source.clone(),
                page: Some(page),
                text,
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_dir_skips_bad_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        std::fs::write(
            root.join("GDPR.txt"),
            "Personal data shall be processed lawfully.",
        )
        .unwrap();
        std::fs::write(root.join("broken.pdf"), b"not really a pdf").unwrap();
        std::fs::write(root.join("latin1.txt"), [0x66u8, 0x6f, 0xe9, 0xff]).unwrap();
        std::fs::write(root.join("readme.md"), "ignored").unwrap();

        let outcome = DocumentLoader::new().load_dir(root).await.unwrap();

        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].source, "GDPR.txt");
        assert_eq!(outcome.files[0].documents.len(), 1);

        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome
            .failures
            .iter()
            .all(|e| matches!(e, RagError::Load { .. })));
    }

    #[tokio::test]
    async fn test_text_document_tagged_with_file_name() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("DPDP.txt"), "Data Principal").unwrap();

        let outcome = DocumentLoader::new().load_dir(temp_dir.path()).await.unwrap();
        let doc = &outcome.files[0].documents[0];
        assert_eq!(doc.source, "DPDP.txt");
        assert_eq!(doc.page, None);
        assert_eq!(doc.text, "Data Principal");
    }

    #[tokio::test]
    async fn test_missing_directory_is_load_error() {
        let result = DocumentLoader::new()
            .load_dir(Path::new("/nonexistent/compliance-docs"))
            .await;
        assert!(matches!(result, Err(RagError::Load { .. })));
    }
}
