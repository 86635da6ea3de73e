//! Knowledge 모듈 - 인덱스 빌드, 저장, 검색
//!
//! - Chunker: 문단 인식 텍스트 분할
//! - Vector: Dense/Sparse 임베딩 + 직렬화
//! - Index: 청크와 벡터의 불변 묶음
//! - Store: SQLite 단일 파일 인덱스 (원자적 교체)
//! - Builder: 페이지 → 인덱스 파이프라인
//! - Cache: 프로세스 전역 인덱스 캐시
//! - Retriever: 코사인 유사도 Top-k 검색

mod builder;
mod cache;
mod chunker;
mod index;
mod retriever;
mod store;
mod vector;

// Re-exports
pub use builder::{needs_rebuild, BuildReport, IndexBuilder};
pub use cache::IndexCache;
pub use chunker::{default_chunker, paragraph_chunker, ChunkConfig, Chunker, ParagraphChunker};
pub use index::{Chunk, Index, IndexMetadata, SourcePage, INDEX_FORMAT_VERSION};
pub use retriever::{top_k, Retriever, ScoredChunk};
pub use store::{get_data_dir, IndexStore, INDEX_FILE_NAME};
pub use vector::{Embedding, SparseVector};
