//! Google Gemini 임베딩 프로바이더
//!
//! `batchEmbedContents` 엔드포인트로 여러 텍스트를 한 번에 임베딩합니다.
//! source: https://ai.google.dev/gemini-api/docs/embeddings

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Result, RetrievalError};

use super::{EmbeddingProvider, SemanticConfig, TaskType};

/// Gemini API 베이스 URL
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 지원 차원 (MRL)
const VALID_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 요청당 최대 텍스트 수
const MAX_BATCH: usize = 100;

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이
const MIN_DELAY_MS: u64 = 1000;

// ============================================================================
// Rate Limiter
// ============================================================================

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration, min_delay: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        // 2. 윈도우 밖의 오래된 요청 제거
        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

// ============================================================================
// GeminiEmbedding
// ============================================================================

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GeminiEmbedding {
    /// 설정으로 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `config` - 모델/차원/엔드포인트 설정
    pub fn from_config(api_key: String, config: &SemanticConfig) -> Result<Self> {
        if !VALID_DIMENSIONS.contains(&config.dimension) {
            return Err(RetrievalError::config(format!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                config.dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RetrievalError::config(format!("Failed to create HTTP client: {}", e)))?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
            Duration::from_millis(MIN_DELAY_MS),
        )));

        Ok(Self {
            api_key,
            client,
            base_url: config
                .endpoint
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
            rate_limiter,
        })
    }

    fn batch_url(&self) -> String {
        format!("{}/models/{}:batchEmbedContents", self.base_url, self.model)
    }
}

/// Gemini API 요청 본문
#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: &'static str,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

fn task_type_name(task: TaskType) -> &'static str {
    match task {
        TaskType::Document => "RETRIEVAL_DOCUMENT",
        TaskType::Query => "RETRIEVAL_QUERY",
    }
}

/// HTTP 상태 코드 분류 (429, 5xx는 일시적)
fn classify_status(status: reqwest::StatusCode, body: &str) -> RetrievalError {
    let detail = match serde_json::from_str::<GeminiError>(body) {
        Ok(error) => format!("{} ({})", error.error.message, error.error.status),
        Err(_) => body.chars().take(200).collect(),
    };

    if status.as_u16() == 429 || status.is_server_error() {
        RetrievalError::TransientBackend(format!("Gemini API {}: {}", status, detail))
    } else {
        RetrievalError::Backend(format!("Gemini API {}: {}", status, detail))
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed_batch(&self, texts: &[String], task: TaskType) -> Result<Vec<Vec<f32>>> {
        if texts.len() > MAX_BATCH {
            return Err(RetrievalError::Backend(format!(
                "batch of {} exceeds Gemini limit of {}",
                texts.len(),
                MAX_BATCH
            )));
        }

        // 빈 텍스트는 요청하지 않고 영벡터로 채움
        let mut results: Vec<Vec<f32>> = vec![vec![0.0; self.dimension]; texts.len()];
        let positions: Vec<usize> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, _)| i)
            .collect();
        if positions.is_empty() {
            return Ok(results);
        }

        let request = BatchEmbedRequest {
            requests: positions
                .iter()
                .map(|&i| EmbedRequest {
                    model: format!("models/{}", self.model),
                    content: EmbedContent {
                        parts: vec![EmbedPart {
                            text: texts[i].clone(),
                        }],
                    },
                    task_type: task_type_name(task),
                    output_dimensionality: self.dimension,
                })
                .collect(),
        };

        {
            let mut limiter = self.rate_limiter.lock().await;
            limiter.acquire().await;
        }

        // API 키는 URL이 아닌 헤더로 전송
        let response = self
            .client
            .post(self.batch_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                RetrievalError::TransientBackend(format!("Failed to send embedding request: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RetrievalError::TransientBackend(format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: BatchEmbedResponse = serde_json::from_str(&body).map_err(|e| {
            RetrievalError::Backend(format!("Failed to parse embedding response: {}", e))
        })?;

        if parsed.embeddings.len() != positions.len() {
            return Err(RetrievalError::Backend(format!(
                "Gemini returned {} embeddings for {} texts",
                parsed.embeddings.len(),
                positions.len()
            )));
        }

        for (&i, embedding) in positions.iter().zip(parsed.embeddings) {
            results[i] = embedding.values;
        }

        tracing::debug!("Embedded batch of {} texts", positions.len());
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH
    }
}

// ============================================================================
// Tests
// ============================================================================
