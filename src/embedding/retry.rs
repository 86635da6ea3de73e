//! 재시도 정책 - 타임아웃 + 지수 백오프
//!
//! 일시적 백엔드 에러(타임아웃, 429, 5xx, 연결 실패)만 재시도합니다.
//! 재시도를 모두 소진하면 `RetrievalError::Unavailable`로 보고합니다.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, RetrievalError};

/// 기본 최대 재시도 횟수
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// 타임아웃/재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 첫 시도 이후 추가 시도 횟수
    pub max_retries: u32,
    /// 첫 재시도 전 대기 (이후 2배씩 증가)
    pub initial_backoff: Duration,
    /// 시도당 타임아웃
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// `attempt`번째 실패 후 대기 시간
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// 작업을 정책에 따라 실행
    ///
    /// `op`는 시도마다 새 future를 만듭니다.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(RetrievalError::TransientBackend(format!(
                    "{} timed out after {:?}",
                    what, self.timeout
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    last_error = e.to_string();
                    if attempt < self.max_retries {
                        let backoff = self.backoff(attempt);
                        tracing::warn!(
                            "{} failed ({}), retrying in {:?} (attempt {}/{})",
                            what,
                            last_error,
                            backoff,
                            attempt + 1,
                            self.max_retries
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(RetrievalError::Unavailable {
            attempts: self.max_retries + 1,
            last: last_error,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
