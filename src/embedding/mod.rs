//! 임베딩 모듈 - 외부 임베딩 백엔드를 통한 텍스트 벡터화
//!
//! 시맨틱 벡터라이저가 사용하는 `text -> 고정 차원 벡터` 배치 호출을 추상화합니다.
//! 프로바이더는 한 번의 시도만 수행하고, 실패를 일시적/결정적으로 분류합니다.
//! 타임아웃과 재시도는 [`RetryPolicy`]가 담당합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let provider = create_embedder(&SemanticConfig::default())?;
//! let vectors = provider.embed_batch(&texts, TaskType::Document).await?;
//! ```

mod gemini;
mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

pub use gemini::{GeminiEmbedding, GEMINI_BASE_URL};
pub use retry::RetryPolicy;

/// 기본 임베딩 모델
pub const DEFAULT_MODEL: &str = "gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 용도 (백엔드가 문서/쿼리를 다르게 인코딩할 수 있음)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Document,
    Query,
}

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 배치 임베딩 (입력 순서 유지)
    async fn embed_batch(&self, texts: &[String], task: TaskType) -> Result<Vec<Vec<f32>>>;

    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()], task)
            .await?
            .pop()
            .ok_or_else(|| RetrievalError::Backend("empty embedding response".to_string()))
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;

    /// 모델 식별자
    fn model(&self) -> &str;

    /// 요청 하나에 담을 수 있는 최대 텍스트 수
    fn max_batch_size(&self) -> usize {
        100
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// 시맨틱 벡터라이저 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    /// 프로바이더 이름 (현재 "gemini")
    pub provider: String,
    /// 모델 이름
    pub model: String,
    /// 출력 차원
    pub dimension: usize,
    /// API 베이스 URL (없으면 기본값)
    pub endpoint: Option<String>,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            endpoint: None,
        }
    }
}

impl SemanticConfig {
    /// 호환성 검사용 identity
    pub fn identity(&self) -> String {
        crate::vectorizer::semantic_identity(&self.provider, &self.model, self.dimension)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(RetrievalError::config("semantic dimension must be greater than 0"));
        }
        if self.model.trim().is_empty() {
            return Err(RetrievalError::config("semantic model must not be empty"));
        }
        if let Some(ref endpoint) = self.endpoint {
            url::Url::parse(endpoint).map_err(|e| {
                RetrievalError::config(format!("invalid embedding endpoint '{}': {}", endpoint, e))
            })?;
        }
        Ok(())
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 환경변수 (우선순위 순)
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    api_key_from(|var| std::env::var(var).ok()).ok_or_else(|| {
        RetrievalError::config(
            "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
             Get your API key at: https://aistudio.google.com/app/apikey",
        )
    })
}

/// 조회 함수로 API 키 선택 (빈 값은 건너뜀)
pub fn api_key_from<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for var in API_KEY_VARS {
        if let Some(key) = lookup(var).filter(|k| !k.is_empty()) {
            tracing::debug!("Using API key from {}", var);
            return Some(key);
        }
    }
    None
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정으로 임베딩 프로바이더 생성
pub fn create_embedder(config: &SemanticConfig) -> Result<Box<dyn EmbeddingProvider>> {
    config.validate()?;

    match config.provider.as_str() {
        "gemini" => {
            let api_key = get_api_key()?;
            let embedder = GeminiEmbedding::from_config(api_key, config)?;
            tracing::info!(
                "Using Gemini embedding {} (dimension: {})",
                embedder.model(),
                embedder.dimension()
            );
            Ok(Box::new(embedder))
        }
        other => Err(RetrievalError::config(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
