//! 빌드 → 저장 → 로드 → 검색 전체 흐름 테스트

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use mevzuat_rag::collector::signature_from_pages;
use mevzuat_rag::{
    BuildConfig, ChunkConfig, EmbeddingProvider, IndexBuilder, IndexCache, IndexStore, RagConfig,
    Result, RetrievalError, Retriever, RetryPolicy, SemanticVectorizer, SourcePage, TaskType,
    TfidfConfig, TfidfVectorizer, VectorizerConfig,
};

// ============================================================================
// Fixtures
// ============================================================================

fn chunk_config() -> ChunkConfig {
    ChunkConfig {
        min_len: 10,
        max_len: 400,
        min_keep_len: 10,
    }
}

fn test_config(dir: &TempDir) -> RagConfig {
    RagConfig {
        data_dir: dir.path().to_path_buf(),
        chunk: chunk_config(),
        ..RagConfig::default()
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_backoff: Duration::from_millis(1),
        timeout: Duration::from_millis(100),
    }
}

fn turkish_pages() -> Vec<SourcePage> {
    vec![
        SourcePage::new("gelir.pdf", 1, "Kira geliri istisnası 33.000 TL'dir."),
        SourcePage::new("gider.pdf", 1, "Araç gideri kısıtlaması %70'tir."),
    ]
}

fn larger_corpus() -> Vec<SourcePage> {
    let texts = [
        "Kira geliri istisnası konut kiralarında uygulanır.",
        "Araç gideri kısıtlaması binek otomobiller için geçerlidir.",
        "Damga vergisi sözleşme bedeli üzerinden hesaplanır.",
        "Katma değer vergisi indirimi belgelerle ispat edilir.",
        "Gelir vergisi beyannamesi mart ayında verilir.",
        "Kurumlar vergisi oranı kazançlar üzerinden uygulanır.",
        "Emlak vergisi belediyelere ödenir.",
    ];
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| SourcePage::new("rehber.pdf", i as u32 + 1, *text))
        .collect()
}

/// 단어 해시 기반 결정적 임베딩 (네트워크 없음)
struct HashingProvider {
    dimension: usize,
    query_failures: Arc<AtomicU32>,
    hang: bool,
}

impl HashingProvider {
    fn new() -> Self {
        Self {
            dimension: 32,
            query_failures: Arc::new(AtomicU32::new(0)),
            hang: false,
        }
    }

    fn failing(times: u32) -> (Self, Arc<AtomicU32>) {
        let counter = Arc::new(AtomicU32::new(times));
        let provider = Self {
            query_failures: Arc::clone(&counter),
            ..Self::new()
        };
        (provider, counter)
    }

    fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dimension];
        for word in text.to_lowercase().split_whitespace() {
            let hash = word
                .bytes()
                .fold(2166136261u32, |h, b| (h ^ u32::from(b)).wrapping_mul(16777619));
            v[hash as usize % self.dimension] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    async fn embed_batch(&self, texts: &[String], task: TaskType) -> Result<Vec<Vec<f32>>> {
        if task == TaskType::Query {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            let remaining = self.query_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.query_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(RetrievalError::TransientBackend("503 Service Unavailable".into()));
            }
        }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }

    fn model(&self) -> &str {
        "fnv-bag-of-words"
    }
}

async fn build_lexical(pages: &[SourcePage], store: &IndexStore, config: &RagConfig) {
    IndexBuilder::from_config(config)
        .unwrap()
        .build_and_write(pages, &signature_from_pages(pages), store)
        .await
        .unwrap();
}

async fn semantic_index(pages: &[SourcePage]) -> Arc<mevzuat_rag::Index> {
    let mut builder = IndexBuilder::new(
        chunk_config(),
        Box::new(SemanticVectorizer::new(Box::new(HashingProvider::new()))),
        &BuildConfig {
            batch_size: 2,
            concurrency: 3,
        },
        fast_policy(),
    );
    Arc::new(builder.build(pages, "semantic").await.unwrap())
}

// ============================================================================
// Lexical
// ============================================================================

#[tokio::test]
async fn test_turkish_scenario() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = config.index_store();
    build_lexical(&turkish_pages(), &store, &config).await;

    let index = IndexCache::new().get_or_load(&store, None).unwrap();
    assert_eq!(index.len(), 2);

    let retriever = Retriever::open(index, &config).unwrap();
    let hits = retriever.search("kira istisnası", 2).await.unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_id, 0);
    assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn test_result_count_order_and_range() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = config.index_store();
    let pages = larger_corpus();
    build_lexical(&pages, &store, &config).await;

    let index = Arc::new(store.read().unwrap());
    let n = index.len();
    assert_eq!(n, pages.len());
    let retriever = Retriever::open(index, &config).unwrap();

    for k in 1..=n {
        let hits = retriever.search("vergisi uygulanır", k).await.unwrap();
        assert_eq!(hits.len(), k);

        let ids: HashSet<usize> = hits.iter().map(|h| h.chunk_id).collect();
        assert_eq!(ids.len(), k);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(hits.iter().all(|h| (-1.0..=1.0).contains(&h.score)));
    }

    let clamped = retriever.search("vergisi", n + 10).await.unwrap();
    assert_eq!(clamped.len(), n);
}

#[tokio::test]
async fn test_self_query_scores_near_one() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = config.index_store();
    build_lexical(&larger_corpus(), &store, &config).await;

    let index = Arc::new(store.read().unwrap());
    let target = index.chunks[3].text.clone();
    let retriever = Retriever::open(index, &config).unwrap();

    let hits = retriever.search(&target, 1).await.unwrap();
    assert_eq!(hits[0].chunk_id, 3);
    assert!((hits[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_empty_corpus_answers_with_empty_list() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = config.index_store();

    let report = IndexBuilder::from_config(&config)
        .unwrap()
        .build_and_write(&[], "nothing", &store)
        .await
        .unwrap();
    assert!(report.empty_corpus);

    let index = Arc::new(store.read().unwrap());
    let retriever = Retriever::open(index, &config).unwrap();
    for k in [0, 1, 10] {
        assert!(retriever.search("kira", k).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_persist_reload_is_identical() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = config.index_store();
    let pages = larger_corpus();

    let mut builder = IndexBuilder::from_config(&config).unwrap();
    let built = builder.build(&pages, "sig").await.unwrap();
    store.write(&built).unwrap();
    let loaded = store.read().unwrap();

    assert_eq!(loaded.chunks, built.chunks);
    assert_eq!(loaded.vectors, built.vectors);
    assert_eq!(loaded.vectorizer_state, built.vectorizer_state);
}

#[tokio::test]
async fn test_fit_is_reproducible() {
    let pages = larger_corpus();
    let config = RagConfig {
        chunk: chunk_config(),
        ..RagConfig::default()
    };

    let a = IndexBuilder::from_config(&config)
        .unwrap()
        .build(&pages, "sig")
        .await
        .unwrap();
    let b = IndexBuilder::from_config(&config)
        .unwrap()
        .build(&pages, "sig")
        .await
        .unwrap();

    assert_eq!(a.vectorizer_state, b.vectorizer_state);
    assert_eq!(a.vectors.len(), b.vectors.len());
    for (x, y) in a.vectors.iter().zip(&b.vectors) {
        assert!((x.dot(y) - 1.0).abs() < 1e-6 || x.norm() == 0.0);
        assert_eq!(x, y);
    }
}

#[tokio::test]
async fn test_incompatible_vectorizer_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = config.index_store();
    build_lexical(&turkish_pages(), &store, &config).await;
    let index = Arc::new(store.read().unwrap());

    let unigram = RagConfig {
        vectorizer: VectorizerConfig::Lexical(TfidfConfig {
            ngram_max: 1,
            ..TfidfConfig::default()
        }),
        ..config.clone()
    };
    assert!(matches!(
        Retriever::open(Arc::clone(&index), &unigram),
        Err(RetrievalError::Configuration(_))
    ));

    let unfitted = TfidfVectorizer::new(TfidfConfig::default());
    assert!(matches!(
        Retriever::new(index, Box::new(unfitted), RetryPolicy::default()),
        Err(RetrievalError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_stale_corpus_is_detected() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = config.index_store();
    let pages = turkish_pages();
    build_lexical(&pages, &store, &config).await;

    let cache = IndexCache::new();
    let current = signature_from_pages(&pages);
    assert!(cache.get_or_load(&store, Some(&current)).is_ok());

    let mut changed = pages.clone();
    changed.push(SourcePage::new("yeni.pdf", 1, "Yeni düzenleme yürürlüğe girdi."));
    let result = cache.get_or_load(&store, Some(&signature_from_pages(&changed)));
    assert!(matches!(result, Err(RetrievalError::Configuration(_))));

    assert!(mevzuat_rag::needs_rebuild(
        &store,
        &signature_from_pages(&changed),
        &config
    ));
}

#[tokio::test]
async fn test_concurrent_queries_share_index() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = config.index_store();
    build_lexical(&larger_corpus(), &store, &config).await;

    let index = IndexCache::new().get_or_load(&store, None).unwrap();
    let retriever = Arc::new(Retriever::open(index, &config).unwrap());
    let expected = retriever.search("vergisi", 3).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let retriever = Arc::clone(&retriever);
            tokio::spawn(async move { retriever.search("vergisi", 3).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), expected);
    }
}

// ============================================================================
// Semantic (fake provider)
// ============================================================================

#[tokio::test]
async fn test_semantic_search_with_fake_provider() {
    let pages = larger_corpus();
    let index = semantic_index(&pages).await;
    assert_eq!(index.metadata.vectorizer_identity, "semantic:hashing:fnv-bag-of-words:32");

    let retriever = Retriever::new(
        index,
        Box::new(SemanticVectorizer::new(Box::new(HashingProvider::new()))),
        fast_policy(),
    )
    .unwrap();

    let hits = retriever
        .search("Emlak vergisi belediyelere ödenir.", 3)
        .await
        .unwrap();
    assert_eq!(hits[0].chunk_id, 6);
    assert!((hits[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let index = semantic_index(&larger_corpus()).await;
    let (provider, remaining) = HashingProvider::failing(2);
    let retriever = Retriever::new(
        index,
        Box::new(SemanticVectorizer::new(Box::new(provider))),
        fast_policy(),
    )
    .unwrap();

    let hits = retriever.search("damga vergisi", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(remaining.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_exhausted_retries_surface_unavailable() {
    let index = semantic_index(&larger_corpus()).await;
    let (provider, _) = HashingProvider::failing(10);
    let retriever = Retriever::new(
        index,
        Box::new(SemanticVectorizer::new(Box::new(provider))),
        fast_policy(),
    )
    .unwrap();

    let result = retriever.search("damga vergisi", 2).await;
    assert!(matches!(
        result,
        Err(RetrievalError::Unavailable { attempts: 3, .. })
    ));
}

#[tokio::test]
async fn test_query_timeout_surfaces_unavailable() {
    let index = semantic_index(&larger_corpus()).await;
    let retriever = Retriever::new(
        index,
        Box::new(SemanticVectorizer::new(Box::new(HashingProvider::hanging()))),
        fast_policy(),
    )
    .unwrap();

    match retriever.search("kira", 1).await {
        Err(RetrievalError::Unavailable { last, .. }) => assert!(last.contains("timed out")),
        other => panic!("expected Unavailable, got {:?}", other.map(|h| h.len())),
    }
}

#[tokio::test]
async fn test_blank_query_is_rejected_before_backend() {
    let index = semantic_index(&larger_corpus()).await;
    let retriever = Retriever::new(
        index,
        Box::new(SemanticVectorizer::new(Box::new(HashingProvider::hanging()))),
        fast_policy(),
    )
    .unwrap();

    assert!(matches!(
        retriever.search(" \n\t", 3).await,
        Err(RetrievalError::MalformedInput(_))
    ));
}
