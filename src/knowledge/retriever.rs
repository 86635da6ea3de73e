//! Retriever - 쿼리 벡터와 인덱스 벡터의 코사인 유사도 Top-k
//!
//! 저장된 벡터와 쿼리 벡터는 모두 L2 정규화돼 있으므로 내적이 곧 코사인입니다.
//! 전체 벡터를 스캔한 뒤 부분 선택(select_nth)으로 k개만 정렬합니다.
//!
//! 정렬 규칙: 점수 내림차순, 같은 점수는 청크 ID 오름차순.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use crate::config::RagConfig;
use crate::embedding::RetryPolicy;
use crate::error::{Result, RetrievalError};
use crate::vectorizer::{restore_vectorizer, Vectorizer, VectorizerState};

use super::index::{Chunk, Index};

// ============================================================================
// Types
// ============================================================================

/// 검색 결과 (청크 ID + 유사도)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: usize,
    /// 코사인 유사도 [-1, 1]
    pub score: f32,
}

// ============================================================================
// Retriever
// ============================================================================

/// 검색기
///
/// 인덱스는 읽기 전용으로 공유되므로 여러 쿼리를 동시에 처리할 수 있습니다.
pub struct Retriever {
    index: Arc<Index>,
    vectorizer: Box<dyn Vectorizer>,
    policy: RetryPolicy,
}

impl Retriever {
    /// 인덱스 + 벡터라이저로 생성
    ///
    /// 벡터라이저 identity나 차원이 인덱스와 다르면 ConfigurationError.
    /// 어휘 벡터라이저는 어휘와 IDF까지 인덱스와 같아야 합니다.
    pub fn new(
        index: Arc<Index>,
        vectorizer: Box<dyn Vectorizer>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let built = index.vectorizer_state.identity();
        let current = vectorizer.state().identity();
        if built != current {
            return Err(RetrievalError::config(format!(
                "index was built with vectorizer '{}' but '{}' was supplied; rebuild the index",
                built, current
            )));
        }

        let dimension = index.vectorizer_state.dimension();
        if vectorizer.dimension() != dimension {
            return Err(RetrievalError::config(format!(
                "vectorizer dimension {} does not match index dimension {}",
                vectorizer.dimension(),
                dimension
            )));
        }

        if matches!(index.vectorizer_state, VectorizerState::Lexical(_))
            && vectorizer.state() != index.vectorizer_state
        {
            return Err(RetrievalError::config(
                "vectorizer vocabulary differs from the one the index was built with; rebuild the index",
            ));
        }

        Ok(Self {
            index,
            vectorizer,
            policy,
        })
    }

    /// 저장된 벡터라이저 상태와 설정으로 검색기 구성
    pub fn open(index: Arc<Index>, config: &RagConfig) -> Result<Self> {
        let vectorizer = restore_vectorizer(&index.vectorizer_state, &config.vectorizer)?;
        Self::new(index, vectorizer, config.search.retry_policy())
    }

    /// Top-k 검색
    ///
    /// 결과 수는 `min(k, 인덱스 크기)`입니다. 빈 쿼리는 MalformedInput.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            return Err(RetrievalError::MalformedInput(
                "query must not be empty".to_string(),
            ));
        }

        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let vectorizer = self.vectorizer.as_ref();
        let query_vector = self
            .policy
            .run("query vectorization", || vectorizer.transform_query(query))
            .await?;

        let dimension = self.index.vectorizer_state.dimension();
        if !query_vector.fits_dimension(dimension) {
            return Err(RetrievalError::config(format!(
                "query vector does not fit index dimension {}",
                dimension
            )));
        }

        let scores: Vec<f32> = self
            .index
            .vectors
            .iter()
            .map(|v| sanitize_score(v.dot(&query_vector)))
            .collect();

        let results = top_k(&scores, k);
        tracing::debug!(
            "Search returned {} of {} chunks (best score {:?})",
            results.len(),
            scores.len(),
            results.first().map(|r| r.score)
        );
        Ok(results)
    }

    /// 검색 + 청크 본문
    pub async fn search_with_chunks(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<(ScoredChunk, &Chunk)>> {
        let results = self.search(query, k).await?;
        results
            .into_iter()
            .map(|hit| {
                self.resolve(hit.chunk_id)
                    .map(|chunk| (hit, chunk))
                    .ok_or_else(|| {
                        RetrievalError::config(format!("chunk {} missing from index", hit.chunk_id))
                    })
            })
            .collect()
    }

    /// ID로 청크 조회
    pub fn resolve(&self, chunk_id: usize) -> Option<&Chunk> {
        self.index.chunk(chunk_id)
    }

    /// 공유 인덱스
    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }
}

// ============================================================================
// Ranking
// ============================================================================

/// NaN 제거 + [-1, 1] 범위 고정 (-0.0은 0.0으로)
fn sanitize_score(score: f32) -> f32 {
    if score.is_nan() || score == 0.0 {
        0.0
    } else {
        score.clamp(-1.0, 1.0)
    }
}

fn rank(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// 점수 배열에서 상위 k개 선택 (인덱스 == 청크 ID)
pub fn top_k(scores: &[f32], k: usize) -> Vec<ScoredChunk> {
    let k = k.min(scores.len());
    if k == 0 {
        return Vec::new();
    }

    let mut hits: Vec<ScoredChunk> = scores
        .iter()
        .enumerate()
        .map(|(chunk_id, &score)| ScoredChunk { chunk_id, score })
        .collect();

    if k < hits.len() {
        hits.select_nth_unstable_by(k - 1, rank);
        hits.truncate(k);
    }
    hits.sort_unstable_by(rank);
    hits
}

// ============================================================================
// Tests
// ============================================================================
