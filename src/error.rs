//! 에러 타입 - 검색 커널 공통 에러
//!
//! 빌드/쿼리 경로에서 발생하는 실패를 분류합니다.
//! - Configuration: 인덱스 누락/불일치, 벡터라이저 비호환 (재시도 없음, 재빌드 필요)
//! - TransientBackend: 임베딩 백엔드 일시 장애 (제한된 재시도)
//! - Unavailable: 재시도 소진 후 검색 불가
//! - MalformedInput: 빈 쿼리 (벡터화 전에 거부)

use thiserror::Error;

/// 검색 커널 에러
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Transient backend error: {0}")]
    TransientBackend(String),

    #[error("Retrieval unavailable after {attempts} attempts: {last}")]
    Unavailable { attempts: u32, last: String },

    /// 백엔드가 결정적으로 거부한 요청 (4xx 등)
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RetrievalError {
    /// 설정 에러 생성 헬퍼
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// 재시도 대상 여부
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientBackend(_))
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
