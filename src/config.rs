//! 설정 - JSON 파일 + 환경변수 오버라이드
//!
//! 우선순위: 기본값 < 설정 파일 < 환경변수 < CLI 플래그
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/mevzuat-rag",
//!   "chunk": { "min_len": 250, "max_len": 1400, "min_keep_len": 80 },
//!   "vectorizer": { "kind": "lexical", "ngram_min": 1, "ngram_max": 2 },
//!   "search": { "default_k": 5, "query_timeout_ms": 15000 },
//!   "build": { "batch_size": 32, "concurrency": 4 }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::embedding::{RetryPolicy, SemanticConfig};
use crate::error::{Result, RetrievalError};
use crate::knowledge::{get_data_dir, ChunkConfig, IndexStore};
use crate::vectorizer::{TfidfConfig, VectorizerConfig};

/// 데이터 디렉토리 환경변수
pub const ENV_DATA_DIR: &str = "MEVZUAT_RAG_DATA_DIR";
/// 벡터라이저 종류 환경변수 ("lexical" | "semantic")
pub const ENV_VECTORIZER: &str = "MEVZUAT_RAG_VECTORIZER";
/// 기본 top-k 환경변수
pub const ENV_TOP_K: &str = "MEVZUAT_RAG_TOP_K";

// ============================================================================
// Sections
// ============================================================================

/// 검색 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// 기본 결과 수
    pub default_k: usize,
    /// 쿼리 벡터화 시도당 타임아웃 (ms)
    pub query_timeout_ms: u64,
    /// 일시적 실패 재시도 횟수
    pub max_retries: u32,
    /// 첫 재시도 대기 (ms)
    pub initial_backoff_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            query_timeout_ms: 15_000,
            max_retries: 2,
            initial_backoff_ms: 500,
        }
    }
}

impl SearchConfig {
    /// 벡터화 호출에 적용할 재시도 정책
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            timeout: Duration::from_millis(self.query_timeout_ms),
        }
    }
}

/// 빌드 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// 벡터화 배치 크기
    pub batch_size: usize,
    /// 동시에 진행할 배치 수
    pub concurrency: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            concurrency: 4,
        }
    }
}

// ============================================================================
// RagConfig
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    pub chunk: ChunkConfig,
    pub vectorizer: VectorizerConfig,
    pub search: SearchConfig,
    pub build: BuildConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            chunk: ChunkConfig::default(),
            vectorizer: VectorizerConfig::default(),
            search: SearchConfig::default(),
            build: BuildConfig::default(),
        }
    }
}

impl RagConfig {
    /// 설정 로드 (파일 → 환경변수 → 검증)
    ///
    /// `path`가 주어졌는데 파일이 없으면 에러입니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// JSON 파일에서 로드
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&raw).map_err(|e| {
            RetrievalError::config(format!("invalid config {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// 프로세스 환경변수 적용
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// 조회 함수로 오버라이드 적용
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(kind) = lookup(ENV_VECTORIZER) {
            self.set_vectorizer_kind(kind.trim())?;
        }

        if let Some(k) = lookup(ENV_TOP_K) {
            self.search.default_k = k.trim().parse().map_err(|_| {
                RetrievalError::config(format!("{} must be a positive integer, got '{}'", ENV_TOP_K, k))
            })?;
        }

        Ok(())
    }

    /// 벡터라이저 종류 전환 (같은 종류면 기존 세부 설정 유지)
    pub fn set_vectorizer_kind(&mut self, kind: &str) -> Result<()> {
        if kind == self.vectorizer.kind() {
            return Ok(());
        }

        self.vectorizer = match kind {
            "lexical" => VectorizerConfig::Lexical(TfidfConfig::default()),
            "semantic" => VectorizerConfig::Semantic(SemanticConfig::default()),
            other => {
                return Err(RetrievalError::config(format!(
                    "unknown vectorizer kind '{}' (expected 'lexical' or 'semantic')",
                    other
                )))
            }
        };
        Ok(())
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        self.chunk.validate()?;
        self.vectorizer.validate()?;

        if self.search.default_k == 0 {
            return Err(RetrievalError::config("search.default_k must be at least 1"));
        }
        if self.search.query_timeout_ms == 0 {
            return Err(RetrievalError::config("search.query_timeout_ms must be greater than 0"));
        }
        if self.build.batch_size == 0 || self.build.concurrency == 0 {
            return Err(RetrievalError::config(
                "build.batch_size and build.concurrency must be at least 1",
            ));
        }
        Ok(())
    }

    /// 인덱스 파일 경로
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(crate::knowledge::INDEX_FILE_NAME)
    }

    /// 인덱스 저장소
    pub fn index_store(&self) -> IndexStore {
        IndexStore::in_dir(&self.data_dir)
    }
}

// ============================================================================
// Tests
// ============================================================================
