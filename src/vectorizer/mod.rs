//! Vectorizer 모듈 - 텍스트를 비교 가능한 벡터로 변환
//!
//! 두 가지 구현을 하나의 전략 트레이트 뒤에 둡니다.
//! - Lexical: 코퍼스에 fit된 TF-IDF (어휘 + 문서 빈도)
//! - Semantic: 외부 임베딩 프로바이더 (배치 호출, fit 없음)
//!
//! 어떤 구현을 쓸지는 설정(`VectorizerConfig`)으로만 결정합니다.
//! fit된 상태(`VectorizerState`)는 인덱스와 함께 저장되고,
//! 쿼리 시 설정과 상태의 identity가 다르면 즉시 ConfigurationError로 실패합니다.

mod semantic;
mod tfidf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::{create_embedder, SemanticConfig};
use crate::error::{Result, RetrievalError};
use crate::knowledge::Embedding;

pub use semantic::SemanticVectorizer;
pub use tfidf::{tokenize, TfidfConfig, TfidfState, TfidfVectorizer};

// ============================================================================
// Vectorizer Trait
// ============================================================================

/// 벡터라이저 전략 트레이트
///
/// 출력 벡터는 항상 L2 정규화되어 있어야 합니다 (내적 == 코사인 유사도).
#[async_trait]
pub trait Vectorizer: Send + Sync {
    /// 코퍼스로 파라미터 학습 (semantic은 no-op)
    async fn fit(&mut self, corpus: &[String]) -> Result<()>;

    /// 텍스트 배치를 벡터로 변환
    async fn transform(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// 쿼리 하나를 벡터로 변환
    async fn transform_query(&self, text: &str) -> Result<Embedding> {
        self.transform(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RetrievalError::Backend("vectorizer returned no vector".to_string()))
    }

    /// 벡터 차원
    fn dimension(&self) -> usize;

    /// 인덱스에 저장할 상태
    fn state(&self) -> VectorizerState;
}

// ============================================================================
// Configuration
// ============================================================================

/// 벡터라이저 선택 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VectorizerConfig {
    Lexical(TfidfConfig),
    Semantic(SemanticConfig),
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        VectorizerConfig::Lexical(TfidfConfig::default())
    }
}

impl VectorizerConfig {
    /// 호환성 검사용 identity
    pub fn identity(&self) -> String {
        match self {
            VectorizerConfig::Lexical(config) => config.identity(),
            VectorizerConfig::Semantic(config) => config.identity(),
        }
    }

    /// 종류 이름 ("lexical" | "semantic")
    pub fn kind(&self) -> &'static str {
        match self {
            VectorizerConfig::Lexical(_) => "lexical",
            VectorizerConfig::Semantic(_) => "semantic",
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        match self {
            VectorizerConfig::Lexical(config) => config.validate(),
            VectorizerConfig::Semantic(config) => config.validate(),
        }
    }
}

// ============================================================================
// Persisted State
// ============================================================================

/// fit된 벡터라이저 상태 (인덱스 메타데이터로 저장)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VectorizerState {
    Lexical(TfidfState),
    Semantic {
        provider: String,
        model: String,
        dimension: usize,
    },
}

impl VectorizerState {
    /// 호환성 검사용 identity (설정의 identity와 같은 형식)
    pub fn identity(&self) -> String {
        match self {
            VectorizerState::Lexical(state) => state.config.identity(),
            VectorizerState::Semantic {
                provider,
                model,
                dimension,
            } => semantic_identity(provider, model, *dimension),
        }
    }

    /// 벡터 차원
    pub fn dimension(&self) -> usize {
        match self {
            VectorizerState::Lexical(state) => state.vocabulary.len(),
            VectorizerState::Semantic { dimension, .. } => *dimension,
        }
    }
}

pub(crate) fn semantic_identity(provider: &str, model: &str, dimension: usize) -> String {
    format!("semantic:{}:{}:{}", provider, model, dimension)
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 빌드용 벡터라이저 생성 (fit 전 상태)
pub fn create_vectorizer(config: &VectorizerConfig) -> Result<Box<dyn Vectorizer>> {
    config.validate()?;

    match config {
        VectorizerConfig::Lexical(tfidf) => Ok(Box::new(TfidfVectorizer::new(tfidf.clone()))),
        VectorizerConfig::Semantic(semantic) => {
            let provider = create_embedder(semantic)?;
            Ok(Box::new(SemanticVectorizer::new(provider)))
        }
    }
}

/// 저장된 상태로 쿼리용 벡터라이저 복원
///
/// 현재 설정이 인덱스를 만든 설정과 다르면 ConfigurationError를 반환합니다.
pub fn restore_vectorizer(
    state: &VectorizerState,
    config: &VectorizerConfig,
) -> Result<Box<dyn Vectorizer>> {
    ensure_compatible(state, config)?;

    match (state, config) {
        (VectorizerState::Lexical(tfidf), _) => {
            Ok(Box::new(TfidfVectorizer::from_state(tfidf.clone())?))
        }
        (VectorizerState::Semantic { .. }, VectorizerConfig::Semantic(semantic)) => {
            let provider = create_embedder(semantic)?;
            Ok(Box::new(SemanticVectorizer::new(provider)))
        }
        (VectorizerState::Semantic { .. }, VectorizerConfig::Lexical(_)) => Err(
            RetrievalError::config("semantic index cannot be queried with a lexical vectorizer"),
        ),
    }
}

/// 설정과 저장 상태의 identity 비교
pub fn ensure_compatible(state: &VectorizerState, config: &VectorizerConfig) -> Result<()> {
    let built = state.identity();
    let configured = config.identity();

    if built != configured {
        return Err(RetrievalError::config(format!(
            "index was built with vectorizer '{}' but '{}' is configured; rebuild the index",
            built, configured
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
