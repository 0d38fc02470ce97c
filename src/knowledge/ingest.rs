//! Ingest Pipeline - 인덱스 빌드
//!
//! Loader -> Normalizer -> Chunker -> Embedder -> Vector Index
//!
//! 파일 단위 로드 실패는 건너뛰고 보고서에 남깁니다.
//! 임베딩 실패는 인덱스 전체를 무효로 만들므로 ingest 를 중단합니다.
//! 인덱스는 항상 전체 재구성되며, 중단된 ingest 는 다시 실행해야 합니다.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::manifest::IndexManifest;
use super::vector::{IndexEntry, VectorIndex};
use super::{recursive_chunker, Chunk, ChunkConfig, Chunker};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extractor::DocumentLoader;

/// 임베딩 요청 묶음 크기 (진행 로그 단위)
const EMBED_BATCH_SIZE: usize = 32;

// ============================================================================
// Report
// ============================================================================

/// 인덱싱된 파일
#[derive(Debug, Clone)]
pub struct IngestedFile {
    pub source: String,
    /// 문서 수 (PDF 는 페이지 수)
    pub documents: usize,
    pub chunks: usize,
}

/// 건너뛴 파일
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub source: String,
    pub reason: String,
}

/// ingest 결과
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files: Vec<IngestedFile>,
    pub skipped: Vec<SkippedFile>,
    pub chunk_count: usize,
    pub sources: BTreeSet<String>,
}

// ============================================================================
// Ingestor
// ============================================================================

/// 인덱스 빌더
pub struct Ingestor {
    loader: DocumentLoader,
    chunk_config: ChunkConfig,
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    manifest_dir: Option<PathBuf>,
}

impl Ingestor {
    pub fn new(
        chunk_config: ChunkConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            loader: DocumentLoader::new(),
            chunker: recursive_chunker(chunk_config.clone()),
            chunk_config,
            embedder,
            index,
            manifest_dir: None,
        }
    }

    /// 빌드 후 매니페스트를 기록할 디렉토리
    pub fn with_manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifest_dir = Some(dir.into());
        self
    }

    /// 디렉토리 전체를 인덱싱 (전체 재구성)
    pub async fn ingest(&self, dir: &Path) -> Result<IngestReport> {
        let outcome = self.loader.load_dir(dir).await?;

        let mut report = IngestReport::default();
        for failure in outcome.failures {
            report.skipped.push(match failure {
                RagError::Load { source_id, message } => SkippedFile {
                    source: source_id,
                    reason: message,
                },
                other => SkippedFile {
                    source: String::new(),
                    reason: other.to_string(),
                },
            });
        }

        tracing::debug!(
            "Chunking with {} (size {}, overlap {})",
            self.chunker.name(),
            self.chunk_config.chunk_size,
            self.chunk_config.chunk_overlap
        );

        let mut chunks: Vec<Chunk> = Vec::new();
        for file in &outcome.files {
            let before = chunks.len();
            for document in &file.documents {
                chunks.extend(self.chunker.chunk(&document.normalized()));
            }

            let produced = chunks.len() - before;
            tracing::debug!("{}: {} chunks", file.source, produced);
            report.files.push(IngestedFile {
                source: file.source.clone(),
                documents: file.documents.len(),
                chunks: produced,
            });
        }

        if chunks.is_empty() {
            return Err(RagError::load(
                dir.display().to_string(),
                "no indexable text found (.pdf / .txt)",
            ));
        }

        let embeddings = self.embed_all(&chunks).await?;

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();

        report.chunk_count = self.index.build(&entries).await?;
        report.sources = entries.iter().map(|e| e.chunk.source.clone()).collect();

        if let Some(manifest_dir) = &self.manifest_dir {
            IndexManifest::new(
                self.embedder.name(),
                self.embedder.dimension(),
                self.chunk_config.clone(),
                report.chunk_count,
                report.sources.iter().cloned().collect(),
            )
            .save(manifest_dir)?;
        }

        tracing::info!(
            "Ingest complete: {} chunks from {} sources ({} skipped)",
            report.chunk_count,
            report.sources.len(),
            report.skipped.len()
        );

        Ok(report)
    }

    async fn embed_all(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let total = chunks.len();
        let mut embeddings = Vec::with_capacity(total);

        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            embeddings.extend(self.embedder.embed_batch(&texts).await?);
            tracing::info!("Embedded {}/{} chunks", embeddings.len(), total);
        }

        Ok(embeddings)
    }
}

// ============================================================================
// Tests
// ============================================================================
