//! Index Manifest - 인덱스 빌드 메타데이터
//!
//! 인덱스를 만든 임베딩 모델/차원/청크 설정을 기록합니다.
//! 질의 시점의 임베딩 설정과 다르면 유사도 점수가 의미가 없으므로
//! 인덱스 에러로 처리하고 재-ingest 를 안내합니다.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ChunkConfig;
use crate::error::{RagError, Result};

/// 매니페스트 파일 이름 (인덱스 디렉토리 안)
pub const MANIFEST_FILE: &str = "manifest.json";

/// 인덱스 매니페스트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub build_id: Uuid,
    pub built_at: DateTime<Utc>,
    /// 임베딩 프로바이더 이름 (예: `ollama/all-minilm`)
    pub embedder: String,
    pub dimension: usize,
    pub chunking: ChunkConfig,
    pub chunk_count: usize,
    /// 인덱스에 포함된 출처 (정렬됨)
    pub sources: Vec<String>,
}

impl IndexManifest {
    pub fn new(
        embedder: impl Into<String>,
        dimension: usize,
        chunking: ChunkConfig,
        chunk_count: usize,
        mut sources: Vec<String>,
    ) -> Self {
        sources.sort();
        sources.dedup();

        Self {
            build_id: Uuid::new_v4(),
            built_at: Utc::now(),
            embedder: embedder.into(),
            dimension,
            chunking,
            chunk_count,
            sources,
        }
    }

    /// 인덱스 디렉토리에 저장
    pub fn save(&self, index_dir: &Path) -> Result<()> {
        let path = index_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize manifest")
            .map_err(RagError::index)?;

        std::fs::create_dir_all(index_dir)
            .and_then(|_| std::fs::write(&path, json))
            .with_context(|| format!("Failed to write manifest: {:?}", path))
            .map_err(RagError::index)?;

        tracing::debug!("Wrote manifest {:?} (build {})", path, self.build_id);
        Ok(())
    }

    /// 인덱스 디렉토리에서 읽기
    pub fn load(index_dir: &Path) -> Result<Self> {
        let path = index_dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(RagError::Index(format!(
                "No index manifest at {}. Run `compliance-rag ingest` first.",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {:?}", path))
            .map_err(RagError::index)?;

        serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt manifest: {:?}", path))
            .map_err(RagError::index)
    }

    /// 현재 임베딩 설정과 호환되는지 확인
    pub fn check_compatible(&self, embedder: &str, dimension: usize) -> Result<()> {
        if self.embedder != embedder || self.dimension != dimension {
            return Err(RagError::Index(format!(
                "Index was built with {} (dim {}), but the current embedder is {} (dim {}). \
                 Re-run `compliance-rag ingest`.",
                self.embedder, self.dimension, embedder, dimension
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> IndexManifest {
        IndexManifest::new(
            "ollama/all-minilm",
            384,
            ChunkConfig::default(),
            42,
            vec!["GDPR.pdf".into(), "DPDP.pdf".into(), "GDPR.pdf".into()],
        )
    }

    #[test]
    fn test_sources_sorted_and_deduped() {
        assert_eq!(sample().sources, vec!["DPDP.pdf", "GDPR.pdf"]);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = sample();
        manifest.save(temp_dir.path()).unwrap();

        let loaded = IndexManifest::load(temp_dir.path()).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_missing_manifest_requires_ingest() {
        let temp_dir = TempDir::new().unwrap();
        let err = IndexManifest::load(temp_dir.path()).unwrap_err();
        assert!(err.requires_reingest());
        assert!(err.to_string().contains("ingest"));
    }

    #[test]
    fn test_corrupt_manifest_is_index_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(MANIFEST_FILE), "{ not json").unwrap();
        assert!(matches!(
            IndexManifest::load(temp_dir.path()),
            Err(RagError::Index(_))
        ));
    }

    #[test]
    fn test_check_compatible() {
        let manifest = sample();
        assert!(manifest.check_compatible("ollama/all-minilm", 384).is_ok());
        assert!(manifest.check_compatible("hash", 384).is_err());
        assert!(manifest.check_compatible("ollama/all-minilm", 768).is_err());
    }
}
