//! CLI 모듈
//!
//! compliance-rag CLI 명령어 정의 및 구현
//!
//! - `ingest`: 입력 폴더(.pdf/.txt)로 인덱스 전체 재구성
//! - `ask`: 검색 + 답변 생성
//! - `search`: 검색만 (컨텍스트 미리보기)
//! - `status`: 설정 / 인덱스 상태

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::assistant::ComplianceAssistant;
use crate::collector::{collect_directory, CollectionStats};
use crate::config::{RagConfig, DEFAULT_CONFIG_FILE};
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::RagError;
use crate::generation::{OllamaGenerator, PromptComposer};
use crate::knowledge::{
    IndexManifest, Ingestor, LanceVectorIndex, RetrievedChunk, Retriever, VectorIndex,
};

/// `ask --show-context` 미리보기 청크 수 / 길이
const CONTEXT_PREVIEW_CHUNKS: usize = 5;
const CONTEXT_PREVIEW_CHARS: usize = 600;
/// `search` 미리보기 길이
const SEARCH_PREVIEW_CHARS: usize = 400;
/// 인덱스 에러 안내 문구
const REINGEST_HINT: &str = "Run `compliance-rag ingest` to rebuild the index";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "compliance-rag")]
#[command(
    version,
    about = "GDPR / DPDP / AI 윤리 가이드라인 로컬 RAG 컴플라이언스 어시스턴트",
    long_about = None
)]
pub struct Cli {
    /// 설정 파일 (기본: ./compliance-rag.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 인덱스 디렉토리 (설정값 덮어쓰기)
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,

    /// 답변 생성 모델 (llm.model 덮어쓰기)
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서 폴더로 인덱스 재구성
    Ingest {
        /// 입력 폴더 (.pdf / .txt)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// 질문에 답변
    Ask {
        /// 질문
        question: String,

        /// 검색된 청크 미리보기 출력
        #[arg(long)]
        show_context: bool,

        /// 전체 질의 타임아웃 (초)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// 검색만 실행
    Search {
        /// 질문
        question: String,

        /// 반환 청크 수 (retrieval_k 덮어쓰기)
        #[arg(short)]
        k: Option<usize>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let config_file = cli.config.clone();

    let result = match cli.command {
        Commands::Ingest { dir } => cmd_ingest(&config, dir).await,
        Commands::Ask {
            question,
            show_context,
            timeout,
        } => cmd_ask(&config, &question, show_context, timeout).await,
        Commands::Search { question, k } => cmd_search(config, &question, k).await,
        Commands::Status => cmd_status(config_file, &config).await,
    };

    result.map_err(with_reingest_hint)
}

/// 인덱스 에러면 재-ingest 안내 추가
fn with_reingest_hint(err: anyhow::Error) -> anyhow::Error {
    let needs_reingest = err
        .chain()
        .filter_map(|e| e.downcast_ref::<RagError>())
        .any(RagError::requires_reingest);

    if needs_reingest && !format!("{:#}", err).contains("compliance-rag ingest") {
        err.context(REINGEST_HINT)
    } else {
        err
    }
}

/// 설정 로드 + CLI 플래그 반영 + 검증
fn load_config(cli: &Cli) -> Result<RagConfig> {
    let mut config = RagConfig::load(cli.config.as_deref())?;

    if let Some(ref index_dir) = cli.index_dir {
        config.index_dir = index_dir.clone();
    }
    if let Some(ref model) = cli.model {
        config.llm.model = model.clone();
    }

    config.validate()?;
    Ok(config)
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인덱스 구성 명령어 (ingest)
async fn cmd_ingest(config: &RagConfig, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| config.data_dir.clone());

    // 통계 표시
    let files = collect_directory(&dir)?;
    let stats = CollectionStats::from_files(&files);
    println!("[*] 수집 대상: {} 파일 ({})", stats.total_files, dir.display());
    println!("    텍스트: {}, PDF: {}", stats.text_files, stats.pdf_files);
    println!("    총 크기: {}", format_bytes(stats.total_size as usize));
    println!();

    let embedder = create_embedder(&config.embedding)?;
    let index = Arc::new(
        LanceVectorIndex::open(&config.index_dir, embedder.dimension()).await?,
    );

    println!("[*] 문서 로드 및 임베딩 생성 중... ({})", embedder.name());

    let ingestor = Ingestor::new(config.chunking.clone(), embedder, index)
        .with_manifest_dir(&config.index_dir);
    let report = ingestor.ingest(&dir).await?;

    let total = report.files.len() + report.skipped.len();
    for (i, file) in report.files.iter().enumerate() {
        println!(
            "[{}/{}] {} ... 완료 ({} 문서, {} 청크)",
            i + 1,
            total,
            file.source,
            file.documents,
            file.chunks
        );
    }
    for (i, skipped) in report.skipped.iter().enumerate() {
        println!(
            "[{}/{}] {} ... 건너뜀: {}",
            report.files.len() + i + 1,
            total,
            skipped.source,
            skipped.reason
        );
    }

    println!();
    println!(
        "[OK] 완료: {} 청크, 출처 {} 개, 실패 {}",
        report.chunk_count,
        report.sources.len(),
        report.skipped.len()
    );
    println!("     인덱스: {}", config.index_dir.display());

    Ok(())
}

/// 질의 응답 명령어 (ask)
async fn cmd_ask(
    config: &RagConfig,
    question: &str,
    show_context: bool,
    timeout: Option<u64>,
) -> Result<()> {
    if question.trim().is_empty() {
        return Err(RagError::EmptyInput.into());
    }

    let (embedder, index) = open_index(config).await?;

    let retriever = Retriever::new(embedder, index, config.retrieval.clone());
    let composer = PromptComposer::new(config.prompt.clone());
    let generator = Arc::new(OllamaGenerator::new(&config.llm)?);
    let assistant = ComplianceAssistant::new(retriever, composer, generator);

    println!("[*] 질문: \"{}\"", question.trim());

    let answer = match timeout {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), assistant.ask(question))
            .await
            .map_err(|_| RagError::Generation(format!("timed out after {}s", secs)))??,
        None => assistant.ask(question).await?,
    };

    if show_context {
        println!("\n[*] 검색된 컨텍스트 (상위 {} 청크):\n", CONTEXT_PREVIEW_CHUNKS);
        print_chunks(
            answer.retrieved.iter().take(CONTEXT_PREVIEW_CHUNKS),
            CONTEXT_PREVIEW_CHARS,
        );
    }

    println!("\n[OK] 답변:\n");
    println!("{}", answer.render());

    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(mut config: RagConfig, question: &str, k: Option<usize>) -> Result<()> {
    if let Some(k) = k {
        config.retrieval.retrieval_k = k;
        config.retrieval.fetch_k = config.retrieval.fetch_k.max(k);
        config.validate()?;
    }

    if question.trim().is_empty() {
        return Err(RagError::EmptyInput.into());
    }

    println!("[*] 검색 중: \"{}\"", question.trim());

    let (embedder, index) = open_index(&config).await?;
    let retriever = Retriever::new(embedder, index, config.retrieval.clone());
    let retrieval = retriever.retrieve(question).await?;

    if retrieval.chunks.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", retrieval.chunks.len());
    print_chunks(retrieval.chunks.iter(), SEARCH_PREVIEW_CHARS);

    if retrieval.expanded {
        println!("[*] 보조 검색으로 출처를 보강했습니다.");
    }
    println!(
        "[*] 출처: {}",
        retrieval.sources.iter().cloned().collect::<Vec<_>>().join(", ")
    );

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config_file: Option<PathBuf>, config: &RagConfig) -> Result<()> {
    println!("compliance-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config_file = config_file.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if config_file.is_file() {
        println!("[*] 설정 파일: {}", config_file.display());
    } else {
        println!("[*] 설정 파일: 없음 (기본값 사용)");
    }
    println!("[*] 입력 폴더: {}", config.data_dir.display());
    println!("[*] 인덱스 디렉토리: {}", config.index_dir.display());
    println!(
        "[*] 임베딩: {:?} {} (dim {}) / LLM: {} @ {}",
        config.embedding.provider,
        config.embedding.model,
        config.embedding.dimension,
        config.llm.model,
        config.llm.base_url
    );

    let manifest = match IndexManifest::load(&config.index_dir) {
        Ok(m) => m,
        Err(e) => {
            println!("[!] {}", e);
            return Ok(());
        }
    };

    println!(
        "[OK] 인덱스 빌드: {} ({})",
        manifest.built_at.format("%Y-%m-%d %H:%M"),
        manifest.build_id
    );
    println!(
        "     임베딩: {} (dim {}), 청크 {} / 오버랩 {}",
        manifest.embedder,
        manifest.dimension,
        manifest.chunking.chunk_size,
        manifest.chunking.chunk_overlap
    );
    println!("     출처: {}", manifest.sources.join(", "));

    match LanceVectorIndex::open(&config.index_dir, manifest.dimension).await {
        Ok(index) => match index.count().await {
            Ok(count) => println!("[OK] 벡터 인덱스: {} 청크", count),
            Err(e) => println!("[!] 벡터 인덱스 조회 실패: {}", e),
        },
        Err(e) => println!("[!] 벡터 인덱스 열기 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 임베딩 + 인덱스 열기 (매니페스트 호환성 확인)
async fn open_index(
    config: &RagConfig,
) -> Result<(Arc<dyn EmbeddingProvider>, Arc<dyn VectorIndex>)> {
    let embedder = create_embedder(&config.embedding)?;

    IndexManifest::load(&config.index_dir)?
        .check_compatible(embedder.name(), embedder.dimension())?;

    let index: Arc<dyn VectorIndex> = Arc::new(
        LanceVectorIndex::open(&config.index_dir, embedder.dimension())
            .await
            .context("인덱스 열기 실패")?,
    );

    Ok((embedder, index))
}

/// 청크 미리보기 출력
fn print_chunks<'a>(chunks: impl Iterator<Item = &'a RetrievedChunk>, max_chars: usize) {
    for (i, c) in chunks.enumerate() {
        println!(
            "{}. [점수: {:.4}] {}",
            i + 1,
            c.score,
            c.chunk.location()
        );
        println!("   {}", truncate_text(&c.chunk.text, max_chars));
        println!();
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
