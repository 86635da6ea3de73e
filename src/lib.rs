//! mevzuat-rag - 문서 검색 커널
//!
//! 문서를 청크로 나누고, TF-IDF(어휘) 또는 외부 임베딩(시맨틱)으로 벡터화해
//! 인덱스 파일에 저장한 뒤, 쿼리와 코사인 유사도가 높은 청크 Top-k를 반환합니다.
//!
//! ```rust,ignore
//! let config = RagConfig::load(None)?;
//! let mut builder = IndexBuilder::from_config(&config)?;
//! builder.build_and_write(&pages, &signature, &config.index_store()).await?;
//!
//! let index = IndexCache::global().get_or_load(&config.index_store(), None)?;
//! let retriever = Retriever::open(index, &config)?;
//! let hits = retriever.search("kira geliri istisnası", 5).await?;
//! ```

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod knowledge;
pub mod vectorizer;

// Re-exports
pub use config::{BuildConfig, RagConfig, SearchConfig};
pub use embedding::{
    create_embedder, get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding, RetryPolicy,
    SemanticConfig, TaskType,
};
pub use error::{Result, RetrievalError};
pub use knowledge::{
    default_chunker, get_data_dir, needs_rebuild, paragraph_chunker, BuildReport, Chunk,
    ChunkConfig, Chunker, Embedding, Index, IndexBuilder, IndexCache, IndexMetadata, IndexStore,
    ParagraphChunker, Retriever, ScoredChunk, SourcePage, SparseVector,
};
pub use vectorizer::{
    create_vectorizer, restore_vectorizer, SemanticVectorizer, TfidfConfig, TfidfVectorizer,
    Vectorizer, VectorizerConfig, VectorizerState,
};
