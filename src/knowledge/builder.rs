//! Index Builder - 페이지 → 청크 → 벡터 → 인덱스 파일
//!
//! 1. 페이지마다 청킹 (청크 ID는 입력 순서대로 0부터 부여)
//! 2. 전체 청크 텍스트로 벡터라이저 fit
//! 3. 배치 단위 벡터화 (동시 실행, 배치마다 재시도 정책 적용)
//! 4. IndexStore에 원자적으로 기록

use std::collections::HashSet;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;

use crate::config::{BuildConfig, RagConfig};
use crate::embedding::RetryPolicy;
use crate::error::{Result, RetrievalError};
use crate::vectorizer::{create_vectorizer, Vectorizer};

use super::cache::IndexCache;
use super::chunker::{paragraph_chunker, ChunkConfig, Chunker};
use super::index::{Chunk, Index, SourcePage};
use super::store::IndexStore;
use super::vector::Embedding;

// ============================================================================
// BuildReport
// ============================================================================

/// 빌드 결과 요약
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub page_count: usize,
    pub source_count: usize,
    pub chunk_count: usize,
    pub dimension: usize,
    pub vectorizer_identity: String,
    pub corpus_signature: String,
    /// 사용 가능한 청크가 하나도 없었는지
    pub empty_corpus: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

// ============================================================================
// IndexBuilder
// ============================================================================

/// 인덱스 빌더
pub struct IndexBuilder {
    chunker: Box<dyn Chunker>,
    chunk_config: ChunkConfig,
    vectorizer: Box<dyn Vectorizer>,
    batch_size: usize,
    concurrency: usize,
    policy: RetryPolicy,
}

impl IndexBuilder {
    /// 구성 요소로 생성
    pub fn new(
        chunk_config: ChunkConfig,
        vectorizer: Box<dyn Vectorizer>,
        build: &BuildConfig,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            chunker: paragraph_chunker(chunk_config),
            chunk_config,
            vectorizer,
            batch_size: build.batch_size.max(1),
            concurrency: build.concurrency.max(1),
            policy,
        }
    }

    /// 전체 설정으로 생성
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        config.validate()?;
        let vectorizer = create_vectorizer(&config.vectorizer)?;
        Ok(Self::new(
            config.chunk,
            vectorizer,
            &config.build,
            config.search.retry_policy(),
        ))
    }

    /// 페이지를 청크로 분할 (ID는 0부터 연속)
    pub fn chunk_pages(&self, pages: &[SourcePage]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            for text in self.chunker.chunk(&page.text) {
                chunks.push(Chunk {
                    id: chunks.len(),
                    source: page.source.clone(),
                    page: page.page,
                    text,
                });
            }
        }
        chunks
    }

    /// 인덱스 빌드 (메모리)
    pub async fn build(&mut self, pages: &[SourcePage], corpus_signature: &str) -> Result<Index> {
        let chunks = self.chunk_pages(pages);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        if chunks.is_empty() {
            tracing::warn!(
                "Empty corpus: {} pages produced no usable chunks; writing an empty index",
                pages.len()
            );
        } else {
            tracing::info!(
                "Chunked {} pages into {} chunks ({})",
                pages.len(),
                chunks.len(),
                self.chunker.name()
            );
        }

        self.vectorizer.fit(&texts).await?;
        let vectors = self.vectorize_batches(&texts).await?;

        Index::new(
            chunks,
            vectors,
            self.vectorizer.state(),
            corpus_signature.to_string(),
            self.chunk_config,
        )
    }

    /// 인덱스 빌드 + 저장
    ///
    /// 같은 경로의 캐시된 인덱스는 무효화됩니다.
    pub async fn build_and_write(
        &mut self,
        pages: &[SourcePage],
        corpus_signature: &str,
        store: &IndexStore,
    ) -> Result<BuildReport> {
        let started = Instant::now();
        let index = self.build(pages, corpus_signature).await?;
        store.write(&index)?;
        IndexCache::global().invalidate_path(store.path());

        let report = BuildReport {
            page_count: pages.len(),
            source_count: pages
                .iter()
                .map(|p| p.source.as_str())
                .collect::<HashSet<_>>()
                .len(),
            chunk_count: index.len(),
            dimension: index.metadata.vector_dimension,
            vectorizer_identity: index.metadata.vectorizer_identity.clone(),
            corpus_signature: corpus_signature.to_string(),
            empty_corpus: index.is_empty(),
            elapsed: started.elapsed(),
        };

        tracing::info!(
            "Built index: {} chunks from {} sources in {:?}",
            report.chunk_count,
            report.source_count,
            report.elapsed
        );
        Ok(report)
    }

    /// 배치 벡터화 (순서 유지)
    async fn vectorize_batches(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectorizer = self.vectorizer.as_ref();
        let policy = self.policy;
        let total = texts.len().div_ceil(self.batch_size);

        let batches: Vec<Vec<Embedding>> = stream::iter(texts.chunks(self.batch_size).enumerate())
            .map(|(i, batch)| async move {
                let label = format!("embedding batch {}/{}", i + 1, total);
                let vectors = policy.run(&label, || vectorizer.transform(batch)).await?;
                tracing::debug!("Finished {} ({} texts)", label, batch.len());
                Ok::<_, RetrievalError>(vectors)
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let vectors: Vec<Embedding> = batches.into_iter().flatten().collect();
        if vectors.len() != texts.len() {
            return Err(RetrievalError::Backend(format!(
                "vectorizer returned {} vectors for {} chunks",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

/// 재빌드 필요 여부
///
/// 인덱스가 없거나, 읽을 수 없거나, 코퍼스/벡터라이저/청킹 설정이 달라졌으면 true
pub fn needs_rebuild(store: &IndexStore, corpus_signature: &str, config: &RagConfig) -> bool {
    if !store.exists() {
        return true;
    }

    match store.read_metadata() {
        Ok(meta) => {
            let stale = meta.corpus_signature != corpus_signature
                || meta.vectorizer_identity != config.vectorizer.identity()
                || meta.chunk_config != config.chunk;
            if stale {
                tracing::info!(
                    "Index is stale (signature {} -> {}, vectorizer {} -> {})",
                    meta.corpus_signature,
                    corpus_signature,
                    meta.vectorizer_identity,
                    config.vectorizer.identity()
                );
            }
            stale
        }
        Err(e) => {
            tracing::warn!("Existing index is unreadable, rebuilding: {}", e);
            true
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorizer::{TfidfConfig, TfidfVectorizer};
    use tempfile::TempDir;

    fn small_chunks() -> ChunkConfig {
        ChunkConfig {
            min_len: 10,
            max_len: 200,
            min_keep_len: 10,
        }
    }

    fn lexical_builder(batch_size: usize) -> IndexBuilder {
        IndexBuilder::new(
            small_chunks(),
            Box::new(TfidfVectorizer::new(TfidfConfig::default())),
            &BuildConfig {
                batch_size,
                concurrency: 3,
            },
            RetryPolicy::default(),
        )
    }

    fn pages() -> Vec<SourcePage> {
        vec![
            SourcePage::new(
                "gelir.pdf",
                1,
                "Kira geliri istisnası 2024 yılı için uygulanır.\n\nBeyanname süresi mart ayında sona erer.",
            ),
            SourcePage::new("kdv.pdf", 1, "Araç gideri ve KDV indirimi hakkında açıklama."),
            SourcePage::new("kdv.pdf", 2, "   "),
        ]
    }

    #[test]
    fn test_chunk_ids_are_dense_and_ordered() {
        let builder = lexical_builder(2);
        let chunks = builder.chunk_pages(&pages());

        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, i);
        }
        assert_eq!(chunks[0].source, "gelir.pdf");
        assert_eq!(chunks[2].source, "kdv.pdf");
    }

    #[tokio::test]
    async fn test_batched_build_matches_single_batch() {
        let a = lexical_builder(1).build(&pages(), "sig").await.unwrap();
        let b = lexical_builder(100).build(&pages(), "sig").await.unwrap();

        assert_eq!(a.chunks, b.chunks);
        assert_eq!(a.vectors, b.vectors);
        assert_eq!(a.vectorizer_state, b.vectorizer_state);
    }

    #[tokio::test]
    async fn test_empty_corpus_builds_empty_index() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::in_dir(dir.path());
        let mut builder = lexical_builder(4);

        let report = builder
            .build_and_write(&[SourcePage::new("blank.txt", 1, "\n\n")], "empty", &store)
            .await
            .unwrap();

        assert!(report.empty_corpus);
        assert_eq!(report.chunk_count, 0);
        assert!(store.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_needs_rebuild() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::in_dir(dir.path());
        let mut config = RagConfig {
            data_dir: dir.path().to_path_buf(),
            chunk: small_chunks(),
            ..RagConfig::default()
        };

        assert!(needs_rebuild(&store, "sig", &config));

        IndexBuilder::from_config(&config)
            .unwrap()
            .build_and_write(&pages(), "sig", &store)
            .await
            .unwrap();

        assert!(!needs_rebuild(&store, "sig", &config));
        assert!(needs_rebuild(&store, "other", &config));

        config.chunk.max_len = 500;
        assert!(needs_rebuild(&store, "sig", &config));
    }
}
