//! Index - 청크 + 벡터 + 벡터라이저 상태의 불변 단위
//!
//! 인덱스는 오프라인에서 한 번 빌드되고, 쿼리 시에는 읽기 전용으로 공유됩니다.
//! `vectors[i]`는 항상 `chunks[i]`에 대응하며 `chunks[i].id == i`입니다.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};
use crate::vectorizer::VectorizerState;

use super::chunker::ChunkConfig;
use super::vector::Embedding;

/// 인덱스 포맷 버전
pub const INDEX_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Types
// ============================================================================

/// 추출기가 넘겨주는 원문 페이지 `(source, page, raw_text)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePage {
    /// 문서 이름
    pub source: String,
    /// 페이지 번호 (1부터 시작)
    pub page: u32,
    /// 원문 텍스트
    pub text: String,
}

impl SourcePage {
    pub fn new(source: impl Into<String>, page: u32, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page,
            text: text.into(),
        }
    }
}

/// 인덱싱된 청크
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 인덱스 내 위치 (0부터 연속)
    pub id: usize,
    /// 문서 이름
    pub source: String,
    /// 페이지 번호
    pub page: u32,
    /// 청크 텍스트
    pub text: String,
}

/// 인덱스 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub format_version: u32,
    pub record_count: usize,
    pub vector_dimension: usize,
    pub vectorizer_identity: String,
    pub corpus_signature: String,
    pub source_count: usize,
    pub chunk_config: ChunkConfig,
    pub built_at: DateTime<Utc>,
}

/// 검색 인덱스
#[derive(Debug, Clone)]
pub struct Index {
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Embedding>,
    pub vectorizer_state: VectorizerState,
    pub metadata: IndexMetadata,
}

impl Index {
    /// 새 인덱스 생성 (메타데이터 계산 + 검증)
    pub fn new(
        chunks: Vec<Chunk>,
        vectors: Vec<Embedding>,
        vectorizer_state: VectorizerState,
        corpus_signature: String,
        chunk_config: ChunkConfig,
    ) -> Result<Self> {
        let source_count = chunks
            .iter()
            .map(|c| c.source.as_str())
            .collect::<HashSet<_>>()
            .len();

        let metadata = IndexMetadata {
            format_version: INDEX_FORMAT_VERSION,
            record_count: chunks.len(),
            vector_dimension: vectorizer_state.dimension(),
            vectorizer_identity: vectorizer_state.identity(),
            corpus_signature,
            source_count,
            chunk_config,
            built_at: Utc::now(),
        };

        let index = Self {
            chunks,
            vectors,
            vectorizer_state,
            metadata,
        };
        index.validate()?;
        Ok(index)
    }

    /// 내부 일관성 검사
    ///
    /// 실패하면 ConfigurationError (인덱스 재빌드 필요)
    pub fn validate(&self) -> Result<()> {
        let meta = &self.metadata;

        if meta.format_version != INDEX_FORMAT_VERSION {
            return Err(RetrievalError::config(format!(
                "unsupported index format version {} (expected {})",
                meta.format_version, INDEX_FORMAT_VERSION
            )));
        }

        if self.chunks.len() != self.vectors.len() || meta.record_count != self.chunks.len() {
            return Err(RetrievalError::config(format!(
                "index is inconsistent: {} chunks, {} vectors, record_count {}",
                self.chunks.len(),
                self.vectors.len(),
                meta.record_count
            )));
        }

        if let Some(pos) = self.chunks.iter().enumerate().position(|(i, c)| c.id != i) {
            return Err(RetrievalError::config(format!(
                "chunk ids are not dense: position {} has id {}",
                pos, self.chunks[pos].id
            )));
        }

        let dimension = self.vectorizer_state.dimension();
        if meta.vector_dimension != dimension {
            return Err(RetrievalError::config(format!(
                "metadata dimension {} does not match vectorizer dimension {}",
                meta.vector_dimension, dimension
            )));
        }

        if meta.vectorizer_identity != self.vectorizer_state.identity() {
            return Err(RetrievalError::config(format!(
                "metadata vectorizer '{}' does not match stored state '{}'",
                meta.vectorizer_identity,
                self.vectorizer_state.identity()
            )));
        }

        if let Some(pos) = self.vectors.iter().position(|v| !v.fits_dimension(dimension)) {
            return Err(RetrievalError::config(format!(
                "vector {} does not fit dimension {}",
                pos, dimension
            )));
        }

        // 어휘 인덱스는 희소, 시맨틱 인덱스는 밀집 벡터만
        let lexical = matches!(self.vectorizer_state, VectorizerState::Lexical(_));
        if let Some(pos) = self
            .vectors
            .iter()
            .position(|v| matches!(v, Embedding::Sparse(_)) != lexical)
        {
            return Err(RetrievalError::config(format!(
                "vector {} representation does not match '{}' vectorizer",
                pos,
                self.vectorizer_state.identity()
            )));
        }

        Ok(())
    }

    /// 청크 수
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// ID로 청크 조회
    pub fn chunk(&self, id: usize) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    /// 코퍼스 시그니처
    pub fn corpus_signature(&self) -> &str {
        &self.metadata.corpus_signature
    }
}

// ============================================================================
// Tests
// ============================================================================
