//! LanceDB Vector Index - 영속 벡터 인덱스
//!
//! 청크 텍스트 + 출처 메타데이터 + 임베딩을 하나의 테이블에 저장합니다.
//! 거리 함수는 코사인 (similarity = 1 - distance)
//! ref: https://lancedb.github.io/lancedb/

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::vector::{Candidate, IndexEntry, RetrievedChunk, VectorIndex};
use super::Chunk;
use crate::error::{RagError, Result};

/// 청크 테이블 이름
const TABLE_NAME: &str = "chunks";

// ============================================================================
// LanceVectorIndex
// ============================================================================

/// LanceDB 벡터 인덱스
///
/// 프로세스 시작 시 한 번 열고 참조로 공유합니다.
pub struct LanceVectorIndex {
    db: Connection,
    path: PathBuf,
    dimension: usize,
}

impl LanceVectorIndex {
    /// 인덱스 디렉토리 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - 인덱스 디렉토리
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        Self::connect(path, dimension)
            .await
            .map_err(RagError::index)
    }

    async fn connect(path: &Path, dimension: usize) -> AnyResult<Self> {
        if !path.exists() {
            tokio::fs::create_dir_all(path)
                .await
                .context("Failed to create index directory")?;
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding: {:?}", path))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            db,
            path: path.to_path_buf(),
            dimension,
        })
    }

    /// 청크 테이블 스키마
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("source", DataType::Utf8, false),
            Field::new("page", DataType::Int32, true),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("chunk_text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[IndexEntry]) -> AnyResult<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != self.dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch for {}: expected {}, got {}",
                bad.chunk.location(),
                self.dimension,
                bad.embedding.len()
            );
        }

        let dimension = i32::try_from(self.dimension).context("Embedding dimension too large")?;

        let sources: Vec<&str> = entries.iter().map(|e| e.chunk.source.as_str()).collect();
        let pages: Vec<Option<i32>> = entries
            .iter()
            .map(|e| {
                e.chunk
                    .page
                    .map(|p| i32::try_from(p).context("Page number out of range"))
                    .transpose()
            })
            .collect::<AnyResult<_>>()?;
        let chunk_indices: Vec<i32> = entries
            .iter()
            .map(|e| i32::try_from(e.chunk.index).context("Chunk index out of range"))
            .collect::<AnyResult<_>>()?;
        let chunk_texts: Vec<&str> = entries.iter().map(|e| e.chunk.text.as_str()).collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(sources)),
                Arc::new(Int32Array::from(pages)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(chunk_texts)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> AnyResult<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;
        Ok(names.iter().any(|n| n == TABLE_NAME))
    }

    /// 질의용 테이블 열기. 없으면 재-ingest 안내
    async fn open_for_query(&self) -> Result<lancedb::table::Table> {
        let exists = self.table_exists().await.map_err(RagError::index)?;
        if !exists {
            return Err(RagError::Index(format!(
                "No index found at {}. Run `compliance-rag ingest` first.",
                self.path.display()
            )));
        }

        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open chunk table")
            .map_err(RagError::index)
    }

    /// 벡터 검색 실행 후 RecordBatch 수집
    async fn query_batches(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<String>,
    ) -> Result<Vec<RecordBatch>> {
        if query.len() != self.dimension {
            return Err(RagError::Index(format!(
                "Query vector has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }

        let table = self.open_for_query().await?;

        let run = async {
            let mut search = table
                .vector_search(query.to_vec())
                .context("Failed to create vector search")?
                .distance_type(DistanceType::Cosine)
                .limit(limit);

            if let Some(filter) = filter {
                search = search.only_if(filter);
            }

            let stream = search
                .execute()
                .await
                .context("Failed to execute vector search")?;

            let batches: Vec<RecordBatch> = stream
                .try_collect()
                .await
                .context("Failed to read search results")?;
            Ok::<_, anyhow::Error>(batches)
        };

        run.await.map_err(RagError::index)
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn build(&self, entries: &[IndexEntry]) -> Result<usize> {
        let batch = self.entries_to_batch(entries).map_err(RagError::index)?;
        let schema = batch.schema();

        let run = async {
            // 전체 재구성: 기존 테이블 삭제
            if self.table_exists().await? {
                self.db
                    .drop_table(TABLE_NAME)
                    .await
                    .context("Failed to drop previous chunk table")?;
                tracing::info!("Dropped previous index at {:?}", self.path);
            }

            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create chunk table")?;
            Ok::<_, anyhow::Error>(())
        };

        run.await.map_err(RagError::index)?;

        tracing::info!("Indexed {} chunks at {:?}", entries.len(), self.path);
        Ok(entries.len())
    }

    async fn search_excluding(
        &self,
        query: &[f32],
        k: usize,
        exclude_sources: &BTreeSet<String>,
    ) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let filter = source_exclusion_filter(exclude_sources);
        let batches = self.query_batches(query, k, filter).await?;

        let mut results = Vec::new();
        for batch in &batches {
            let rows = read_rows(batch, false).map_err(RagError::index)?;
            results.extend(rows.into_iter().map(|row| RetrievedChunk {
                chunk: row.chunk,
                score: row.score,
            }));
        }

        Ok(results)
    }

    async fn fetch_candidates(&self, query: &[f32], fetch_k: usize) -> Result<Vec<Candidate>> {
        if fetch_k == 0 {
            return Ok(vec![]);
        }

        let batches = self.query_batches(query, fetch_k, None).await?;

        let mut candidates = Vec::new();
        for batch in &batches {
            let rows = read_rows(batch, true).map_err(RagError::index)?;
            candidates.extend(rows.into_iter().map(|row| Candidate {
                entry: IndexEntry {
                    chunk: row.chunk,
                    embedding: row.embedding,
                },
                score: row.score,
            }));
        }

        Ok(candidates)
    }

    async fn count(&self) -> Result<usize> {
        let table = self.open_for_query().await?;
        table
            .count_rows(None)
            .await
            .context("Failed to count rows")
            .map_err(RagError::index)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 검색 결과 한 행
struct Row {
    chunk: Chunk,
    embedding: Vec<f32>,
    score: f32,
}

/// RecordBatch 에서 행 추출
fn read_rows(batch: &RecordBatch, with_embedding: bool) -> AnyResult<Vec<Row>> {
    let sources = batch
        .column_by_name("source")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing source column"))?;

    let pages = batch
        .column_by_name("page")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing page column"))?;

    let chunk_indices = batch
        .column_by_name("chunk_index")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing chunk_index column"))?;

    let chunk_texts = batch
        .column_by_name("chunk_text")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing chunk_text column"))?;

    // _distance 컬럼 (LanceDB가 자동 추가)
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

    let embeddings = if with_embedding {
        Some(
            batch
                .column_by_name("embedding")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing embedding column"))?,
        )
    } else {
        None
    };

    let mut rows = Vec::with_capacity(batch.num_rows());

    for i in 0..batch.num_rows() {
        let embedding = match embeddings {
            Some(list) => {
                let values = list.value(i);
                let floats = values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| anyhow::anyhow!("Embedding values are not f32"))?;
                floats.values().to_vec()
            }
            None => Vec::new(),
        };

        let page = if pages.is_null(i) {
            None
        } else {
            Some(u32::try_from(pages.value(i)).context("Negative page number in index")?)
        };
        let index = usize::try_from(chunk_indices.value(i))
            .context("Negative chunk index in index")?;

        rows.push(Row {
            chunk: Chunk {
                source: sources.value(i).to_string(),
                page,
                index,
                text: chunk_texts.value(i).to_string(),
            },
            embedding,
            // 코사인 거리 -> 유사도
            score: 1.0 - distances.value(i),
        });
    }

    Ok(rows)
}

/// `source NOT IN (...)` 필터 생성 (작은따옴표 이스케이프)
fn source_exclusion_filter(exclude_sources: &BTreeSet<String>) -> Option<String> {
    if exclude_sources.is_empty() {
        return None;
    }

    let list = exclude_sources
        .iter()
        .map(|s| format!("'{}'", s.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ");

    Some(format!("source NOT IN ({})", list))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn create_test_entry(source: &str, index: usize, embedding: [f32; DIM]) -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                source: source.to_string(),
                page: if source.ends_with(".pdf") { Some(1) } else { None },
                index,
                text: format!("Test chunk {} for {}", index, source),
            },
            embedding: embedding.to_vec(),
        }
    }

    fn sample_entries() -> Vec<IndexEntry> {
        vec![
            create_test_entry("GDPR.pdf", 0, [1.0, 0.0, 0.0, 0.0]),
            create_test_entry("GDPR.pdf", 1, [0.9, 0.1, 0.0, 0.0]),
            create_test_entry("DPDP.txt", 0, [0.0, 1.0, 0.0, 0.0]),
            create_test_entry("O'Neil.txt", 0, [0.0, 0.0, 1.0, 0.0]),
        ]
    }

    #[test]
    fn test_source_exclusion_filter() {
        assert_eq!(source_exclusion_filter(&BTreeSet::new()), None);

        let exclude: BTreeSet<String> =
            ["GDPR.pdf".to_string(), "O'Neil.txt".to_string()].into_iter().collect();
        assert_eq!(
            source_exclusion_filter(&exclude).unwrap(),
            "source NOT IN ('GDPR.pdf', 'O''Neil.txt')"
        );
    }

    #[tokio::test]
    async fn test_query_before_ingest_is_index_error() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(temp_dir.path(), DIM).await.unwrap();

        let result = index.search_similar(&[1.0, 0.0, 0.0, 0.0], 3).await;
        assert!(matches!(result, Err(RagError::Index(_))));
        assert!(index.count().await.is_err());
    }

    #[tokio::test]
    async fn test_lance_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(temp_dir.path(), DIM).await.unwrap();

        let entries = sample_entries();
        assert_eq!(index.build(&entries).await.unwrap(), 4);
        assert_eq!(index.count().await.unwrap(), 4);

        let results = index.search_similar(&[1.0, 0.0, 0.0, 0.0], 4).await.unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].chunk.source, "GDPR.pdf");
        assert_eq!(results[0].chunk.page, Some(1));
        assert!((results[0].score - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_lance_rebuild_replaces_contents() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(temp_dir.path(), DIM).await.unwrap();

        index.build(&sample_entries()).await.unwrap();
        index
            .build(&[create_test_entry("A.txt", 0, [1.0, 1.0, 0.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lance_search_excluding() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(temp_dir.path(), DIM).await.unwrap();
        index.build(&sample_entries()).await.unwrap();

        let exclude: BTreeSet<String> = ["GDPR.pdf".to_string()].into_iter().collect();
        let results = index
            .search_excluding(&[1.0, 0.0, 0.0, 0.0], 5, &exclude)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.chunk.source != "GDPR.pdf"));
    }

    #[tokio::test]
    async fn test_lance_candidates_carry_vectors() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(temp_dir.path(), DIM).await.unwrap();
        index.build(&sample_entries()).await.unwrap();

        let candidates = index
            .fetch_candidates(&[1.0, 0.0, 0.0, 0.0], 3)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| c.entry.embedding.len() == DIM));

        let diverse = index
            .search_diverse(&[1.0, 0.0, 0.0, 0.0], 2, 4, 0.3)
            .await
            .unwrap();
        assert_eq!(diverse.len(), 2);
        assert_ne!(diverse[0].chunk.source, diverse[1].chunk.source);
    }

    #[tokio::test]
    async fn test_build_rejects_wrong_dimension() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(temp_dir.path(), 8).await.unwrap();
        let result = index.build(&sample_entries()).await;
        assert!(matches!(result, Err(RagError::Index(_))));
    }

    #[tokio::test]
    async fn test_build_rejects_out_of_range_position() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(temp_dir.path(), DIM).await.unwrap();
        index.build(&sample_entries()).await.unwrap();

        let mut entries = sample_entries();
        entries[0].chunk.page = Some(u32::MAX);
        let err = index.build(&entries).await.unwrap_err();
        assert!(err.to_string().contains("Page number out of range"));

        let mut entries = sample_entries();
        entries[1].chunk.index = usize::MAX;
        let err = index.build(&entries).await.unwrap_err();
        assert!(err.to_string().contains("Chunk index out of range"));

        // 변환 실패 시 기존 인덱스 유지
        assert_eq!(index.count().await.unwrap(), 4);
    }
}
