//! Semantic Vectorizer - 외부 임베딩 프로바이더 래퍼
//!
//! fit 단계가 없고, 프로바이더의 모델 identity만 상태로 기록합니다.
//! 모든 출력은 차원 검사 후 L2 정규화됩니다.

use async_trait::async_trait;

use crate::embedding::{EmbeddingProvider, TaskType};
use crate::error::{Result, RetrievalError};
use crate::knowledge::Embedding;

use super::{Vectorizer, VectorizerState};

/// 시맨틱 벡터라이저
pub struct SemanticVectorizer {
    provider: Box<dyn EmbeddingProvider>,
}

impl SemanticVectorizer {
    /// 프로바이더로 생성
    pub fn new(provider: Box<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// 프로바이더 출력 검사 + 정규화
    fn finish(&self, raw: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Embedding>> {
        if raw.len() != expected {
            return Err(RetrievalError::Backend(format!(
                "{} returned {} vectors for {} texts",
                self.provider.name(),
                raw.len(),
                expected
            )));
        }

        let dimension = self.provider.dimension();
        raw.into_iter()
            .map(|values| {
                if values.len() != dimension {
                    return Err(RetrievalError::Backend(format!(
                        "{} returned a {}-dimensional vector, expected {}",
                        self.provider.name(),
                        values.len(),
                        dimension
                    )));
                }
                Ok(Embedding::Dense(values).normalized())
            })
            .collect()
    }
}

#[async_trait]
impl Vectorizer for SemanticVectorizer {
    async fn fit(&mut self, corpus: &[String]) -> Result<()> {
        tracing::debug!(
            "Semantic vectorizer needs no fitting ({} documents, model {})",
            corpus.len(),
            self.provider.model()
        );
        Ok(())
    }

    async fn transform(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let batch_size = self.provider.max_batch_size().max(1);
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(batch_size) {
            let raw = self.provider.embed_batch(batch, TaskType::Document).await?;
            out.extend(self.finish(raw, batch.len())?);
        }

        Ok(out)
    }

    async fn transform_query(&self, text: &str) -> Result<Embedding> {
        let raw = self
            .provider
            .embed_batch(&[text.to_string()], TaskType::Query)
            .await?;
        self.finish(raw, 1)?
            .pop()
            .ok_or_else(|| RetrievalError::Backend("empty embedding response".to_string()))
    }

    fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    fn state(&self) -> VectorizerState {
        VectorizerState::Semantic {
            provider: self.provider.name().to_string(),
            model: self.provider.model().to_string(),
            dimension: self.provider.dimension(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// 결정적 가짜 프로바이더 (문자 빈도 기반)
    struct CharProvider {
        dimension: usize,
        batch: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for CharProvider {
        async fn embed_batch(&self, texts: &[String], _task: TaskType) -> Result<Vec<Vec<f32>>> {
            assert!(texts.len() <= self.batch);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; self.dimension];
                    for c in t.chars() {
                        v[c as usize % self.dimension] += 1.0;
                    }
                    v
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "chars"
        }

        fn model(&self) -> &str {
            "char-histogram"
        }

        fn max_batch_size(&self) -> usize {
            self.batch
        }
    }

    /// 차원이 틀린 벡터를 반환하는 프로바이더
    struct WrongDimension;

    #[async_trait]
    impl EmbeddingProvider for WrongDimension {
        async fn embed_batch(&self, texts: &[String], _task: TaskType) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0; 3]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "wrong"
        }

        fn model(&self) -> &str {
            "wrong"
        }
    }

    #[tokio::test]
    async fn test_transform_batches_and_normalizes() {
        let v = SemanticVectorizer::new(Box::new(CharProvider {
            dimension: 16,
            batch: 2,
        }));
        let texts: Vec<String> = (0..5).map(|i| format!("metin {}", i)).collect();

        let out = v.transform(&texts).await.unwrap();
        assert_eq!(out.len(), 5);
        for e in &out {
            assert!(e.fits_dimension(16));
            assert!((e.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn test_state_records_model_identity() {
        let v = SemanticVectorizer::new(Box::new(CharProvider {
            dimension: 8,
            batch: 10,
        }));
        assert_eq!(v.state().identity(), "semantic:chars:char-histogram:8");
        assert_eq!(v.state().dimension(), 8);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_backend_error() {
        let v = SemanticVectorizer::new(Box::new(WrongDimension));
        let result = v.transform_query("sorgu").await;
        assert!(matches!(result, Err(RetrievalError::Backend(_))));
    }
}
