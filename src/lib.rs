//! compliance-rag - 로컬 RAG 컴플라이언스 어시스턴트
//!
//! GDPR, 인도 DPDP 법, AI 윤리 가이드라인 문서를 인덱싱하고
//! 여러 출처를 함께 근거로 삼는 구조화된 답변을 생성합니다.
//!
//! - ingest: Loader -> Normalizer -> Chunker -> Embedder -> LanceDB
//! - query: Retriever (MMR + 다중 출처 보장) -> Prompt Composer -> Ollama

pub mod assistant;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;

// Re-exports
pub use assistant::{Answer, ComplianceAssistant};
pub use config::RagConfig;
pub use embedding::{create_embedder, EmbeddingProvider, HashEmbedding, OllamaEmbedding};
pub use error::{RagError, Result};
pub use generation::{AnswerGenerator, OllamaGenerator, PromptComposer};
pub use knowledge::{
    get_data_dir, normalize, recursive_chunker, Chunk, ChunkConfig, Chunker, Document,
    IndexManifest, Ingestor, LanceVectorIndex, MemoryVectorIndex, Retrieval, Retriever,
    VectorIndex,
};
