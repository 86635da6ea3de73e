//! CLI 모듈
//!
//! mevzuat-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::collector::{corpus_signature, CollectionStats, CollectorConfig, FileCollector};
use crate::config::RagConfig;
use crate::embedding::has_api_key;
use crate::extractor::ContentExtractor;
use crate::knowledge::{needs_rebuild, ChunkConfig, IndexBuilder, IndexCache, Retriever};
use crate::vectorizer::VectorizerConfig;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "mevzuat-rag")]
#[command(version, about = "문서 검색 커널 (TF-IDF / 임베딩 Top-k)", long_about = None)]
pub struct Cli {
    /// 설정 파일 (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 데이터 디렉토리 (인덱스 저장 위치)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 코퍼스에서 인덱스 빌드
    Build {
        /// 코퍼스 폴더 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 단일 파일
        #[arg(long)]
        file: Option<PathBuf>,

        /// 코퍼스가 그대로여도 다시 빌드
        #[arg(long)]
        force: bool,

        /// PDF용 청킹 설정 사용 (짧은 조각 제거 강화)
        #[arg(long)]
        pdf_preset: bool,

        /// PDF 파일 건너뛰기
        #[arg(long)]
        skip_pdfs: bool,
    },

    /// 인덱스 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 (기본: 설정의 default_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,

        /// 코퍼스 폴더 (지정하면 인덱스가 최신인지 확인)
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// 코퍼스 확인 시 PDF 제외 (build --skip-pdfs로 만든 인덱스용)
        #[arg(long, requires = "corpus")]
        skip_pdfs: bool,
    },

    /// 청크 본문 보기
    Show {
        /// 청크 ID
        id: usize,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = RagConfig::load(cli.config.as_deref()).context("설정 로드 실패")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    match cli.command {
        Commands::Build {
            dir,
            file,
            force,
            pdf_preset,
            skip_pdfs,
        } => {
            if pdf_preset {
                config.chunk = ChunkConfig::for_pdf();
            }
            cmd_build(&config, dir, file, force, skip_pdfs).await
        }
        Commands::Query {
            query,
            k,
            json,
            corpus,
            skip_pdfs,
        } => {
            let k = k.unwrap_or(config.search.default_k);
            cmd_query(&config, &query, k, json, corpus.as_deref(), skip_pdfs).await
        }
        Commands::Show { id } => cmd_show(&config, id),
        Commands::Status => cmd_status(&config),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인덱스 빌드 명령어 (build)
///
/// 파일을 수집해 페이지로 추출하고, 청킹/벡터화 후 인덱스 파일을 교체합니다.
async fn cmd_build(
    config: &RagConfig,
    dir: Option<PathBuf>,
    file: Option<PathBuf>,
    force: bool,
    skip_pdfs: bool,
) -> Result<()> {
    if matches!(config.vectorizer, VectorizerConfig::Semantic(_)) && !has_api_key() {
        bail!(
            "시맨틱 벡터라이저에는 API 키가 필요합니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }

    let collector = corpus_collector(skip_pdfs);

    // 파일 수집
    let files = if let Some(ref file_path) = file {
        match collector.collect_file(file_path)? {
            Some(f) => vec![f],
            None => {
                println!("[!] 지원하지 않는 파일 형식: {:?}", file_path);
                return Ok(());
            }
        }
    } else if let Some(ref dir_path) = dir {
        collector.collect_directory(dir_path)?
    } else {
        bail!("--dir 또는 --file을 지정해야 합니다");
    };

    let stats = CollectionStats::from_files(&files);
    println!("[*] 수집 대상: {} 파일", stats.total_files);
    println!("    텍스트: {}, PDF: {}", stats.text_files, stats.pdf_files);
    println!("    총 크기: {}", format_bytes(stats.total_size as usize));

    let store = config.index_store();
    let signature = corpus_signature(&files);

    if !force && !needs_rebuild(&store, &signature, config) {
        println!("[OK] 인덱스가 최신입니다 (재빌드하려면 --force)");
        return Ok(());
    }

    println!("[*] 텍스트 추출 중...");
    let pages = ContentExtractor::new().extract_all(&files).await;
    println!("    페이지: {}", pages.len());

    println!(
        "[*] 인덱스 빌드 중 ({})...",
        config.vectorizer.identity()
    );
    let mut builder = IndexBuilder::from_config(config).context("인덱스 빌더 생성 실패")?;
    let report = builder
        .build_and_write(&pages, &signature, &store)
        .await
        .context("인덱스 빌드 실패")?;

    if report.empty_corpus {
        println!("[!] 사용할 수 있는 청크가 없습니다. 빈 인덱스를 저장했습니다.");
    }

    println!();
    println!(
        "[OK] 완료: 청크 {}, 문서 {}, 차원 {} ({:.1}초)",
        report.chunk_count,
        report.source_count,
        report.dimension,
        report.elapsed.as_secs_f64()
    );
    println!("     인덱스: {}", store.path().display());

    Ok(())
}

/// build와 query가 같은 파일 집합을 보도록 공유하는 수집기
fn corpus_collector(skip_pdfs: bool) -> FileCollector {
    FileCollector::new(CollectorConfig {
        skip_pdfs,
        ..Default::default()
    })
}

/// 폴더의 코퍼스 시그니처
fn directory_signature(dir: &Path, skip_pdfs: bool) -> Result<String> {
    let files = corpus_collector(skip_pdfs)
        .collect_directory(dir)
        .context("코퍼스 수집 실패")?;
    Ok(corpus_signature(&files))
}

/// JSON 출력용 검색 결과
#[derive(Serialize)]
struct QueryHit<'a> {
    rank: usize,
    chunk_id: usize,
    score: f32,
    source: &'a str,
    page: u32,
    text: &'a str,
}

/// 검색 명령어 (query)
async fn cmd_query(
    config: &RagConfig,
    query: &str,
    k: usize,
    json: bool,
    corpus: Option<&Path>,
    skip_pdfs: bool,
) -> Result<()> {
    let expected = match corpus {
        Some(dir) => Some(directory_signature(dir, skip_pdfs)?),
        None => None,
    };

    let index = IndexCache::global()
        .get_or_load(&config.index_store(), expected.as_deref())
        .context("인덱스 로드 실패")?;
    let retriever = Retriever::open(index, config).context("검색기 초기화 실패")?;

    let hits = retriever
        .search_with_chunks(query, k)
        .await
        .context("검색 실패")?;

    if json {
        let out: Vec<QueryHit> = hits
            .iter()
            .enumerate()
            .map(|(i, (hit, chunk))| QueryHit {
                rank: i + 1,
                chunk_id: hit.chunk_id,
                score: hit.score,
                source: &chunk.source,
                page: chunk.page,
                text: &chunk.text,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("[*] 검색 중: \"{}\"", query);

    if hits.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", hits.len());

    for (i, (hit, chunk)) in hits.iter().enumerate() {
        println!(
            "{}. [점수: {:.4}] 청크 #{} | {} (p. {})",
            i + 1,
            hit.score,
            hit.chunk_id,
            chunk.source,
            chunk.page
        );
        println!("   {}", truncate_text(&chunk.text, 200));
        println!();
    }

    Ok(())
}

/// 청크 보기 명령어 (show)
fn cmd_show(config: &RagConfig, id: usize) -> Result<()> {
    let index = IndexCache::global()
        .get_or_load(&config.index_store(), None)
        .context("인덱스 로드 실패")?;

    let chunk = index
        .chunk(id)
        .ok_or_else(|| anyhow::anyhow!("청크 #{}를 찾을 수 없습니다 (전체 {} 개)", id, index.len()))?;

    println!("[OK] 청크 #{} | {} (p. {})", chunk.id, chunk.source, chunk.page);
    println!("     {} chars", chunk.text.chars().count());
    println!();
    println!("{}", chunk.text);

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config: &RagConfig) -> Result<()> {
    println!("mevzuat-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!("[*] 벡터라이저: {}", config.vectorizer.identity());

    if let VectorizerConfig::Semantic(_) = config.vectorizer {
        if has_api_key() {
            println!("[OK] API 키: 설정됨");
        } else {
            println!("[!] API 키: 미설정");
            println!("    설정: export GEMINI_API_KEY=your-key");
        }
    }

    let store = config.index_store();
    if !store.exists() {
        println!("[!] 인덱스 없음: {}", store.path().display());
        println!("    빌드: mevzuat-rag build --dir <코퍼스>");
        return Ok(());
    }

    match store.read_metadata() {
        Ok(meta) => {
            let size = std::fs::metadata(store.path())
                .map(|m| m.len() as usize)
                .unwrap_or(0);
            println!("[OK] 인덱스: {}", store.path().display());
            println!(
                "     청크 {} | 문서 {} | 차원 {} | {}",
                meta.record_count,
                meta.source_count,
                meta.vector_dimension,
                format_bytes(size)
            );
            println!("     벡터라이저: {}", meta.vectorizer_identity);
            println!("     빌드 시각: {}", meta.built_at.format("%Y-%m-%d %H:%M"));
            println!("     코퍼스 시그니처: {}", truncate_text(&meta.corpus_signature, 16));

            if meta.vectorizer_identity != config.vectorizer.identity() {
                println!("[!] 현재 설정과 벡터라이저가 다릅니다. 다시 빌드하세요.");
            }
        }
        Err(e) => {
            println!("[!] 인덱스 읽기 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        let turkish = "Gelir Vergisi Kanunu";
        assert_eq!(truncate_text(turkish, 5), "Gelir...");
    }

    #[test]
    fn test_cli_parses_query() {
        let cli = Cli::parse_from([
            "mevzuat-rag",
            "--data-dir",
            "/tmp/rag",
            "query",
            "kira geliri",
            "-k",
            "3",
            "--json",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/rag")));
        match cli.command {
            Commands::Query {
                query,
                k,
                json,
                corpus,
                skip_pdfs,
            } => {
                assert_eq!(query, "kira geliri");
                assert_eq!(k, Some(3));
                assert!(json);
                assert!(corpus.is_none());
                assert!(!skip_pdfs);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_cli_parses_build() {
        let cli = Cli::parse_from(["mevzuat-rag", "build", "--dir", "docs", "--force", "--pdf-preset"]);
        match cli.command {
            Commands::Build {
                dir,
                force,
                pdf_preset,
                file,
                ..
            } => {
                assert_eq!(dir, Some(PathBuf::from("docs")));
                assert!(force && pdf_preset);
                assert!(file.is_none());
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn test_cli_parses_query_skip_pdfs() {
        let cli = Cli::parse_from([
            "mevzuat-rag",
            "query",
            "kdv",
            "--corpus",
            "docs",
            "--skip-pdfs",
        ]);
        match cli.command {
            Commands::Query {
                corpus, skip_pdfs, ..
            } => {
                assert_eq!(corpus, Some(PathBuf::from("docs")));
                assert!(skip_pdfs);
            }
            _ => panic!("expected query command"),
        }

        // --corpus 없이 --skip-pdfs만 주면 거부
        assert!(Cli::try_parse_from(["mevzuat-rag", "query", "kdv", "--skip-pdfs"]).is_err());
    }

    #[test]
    fn test_query_signature_matches_build_without_pdfs() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("gelir.txt"), "Kira geliri istisnası").unwrap();
        std::fs::write(dir.path().join("kdv.pdf"), b"%PDF-1.4").unwrap();

        // build --skip-pdfs와 같은 파일 집합
        let build_files = corpus_collector(true).collect_directory(dir.path()).unwrap();
        assert_eq!(build_files.len(), 1);
        let built = corpus_signature(&build_files);

        assert_eq!(directory_signature(dir.path(), true).unwrap(), built);
        assert_ne!(directory_signature(dir.path(), false).unwrap(), built);
    }
}
