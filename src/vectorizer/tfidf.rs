//! Lexical Vectorizer - TF-IDF
//!
//! 청크 코퍼스에 fit하여 고정 어휘와 IDF 가중치를 만듭니다.
//! - 소문자화, 토큰 패턴 `\b\w\w+\b` (유니코드)
//! - 단어 n-gram (기본 1~2)
//! - 문서 빈도 가지치기 (min_df: 개수, max_df: 비율)
//! - smooth idf: ln((1 + n) / (1 + df)) + 1
//!
//! ref: https://scikit-learn.org/stable/modules/feature_extraction.html#tfidf-term-weighting

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};
use crate::knowledge::{Embedding, SparseVector};

use super::{Vectorizer, VectorizerState};

// ============================================================================
// Configuration
// ============================================================================

/// TF-IDF 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TfidfConfig {
    /// 최소 n-gram 길이
    pub ngram_min: usize,
    /// 최대 n-gram 길이
    pub ngram_max: usize,
    /// 이 개수 미만의 문서에만 나오는 용어 제외
    pub min_df: usize,
    /// 이 비율을 초과하는 문서에 나오는 용어 제외 (0.0 ~ 1.0)
    pub max_df: f32,
    /// 소문자화 여부
    pub lowercase: bool,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            ngram_min: 1,
            ngram_max: 2,
            min_df: 1,
            max_df: 1.0,
            lowercase: true,
        }
    }
}

impl TfidfConfig {
    /// 호환성 검사용 identity
    pub fn identity(&self) -> String {
        format!(
            "tfidf:ngram={}-{}:min_df={}:max_df={}:lowercase={}",
            self.ngram_min, self.ngram_max, self.min_df, self.max_df, self.lowercase
        )
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.ngram_min == 0 || self.ngram_min > self.ngram_max {
            return Err(RetrievalError::config(format!(
                "invalid ngram range: {}..={}",
                self.ngram_min, self.ngram_max
            )));
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(RetrievalError::config(format!(
                "max_df must be in (0, 1], got {}",
                self.max_df
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Persisted State
// ============================================================================

/// fit된 TF-IDF 파라미터
///
/// `vocabulary[i]`의 IDF는 `idf[i]`이며, 어휘는 사전순으로 정렬되어 있습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfState {
    pub config: TfidfConfig,
    pub vocabulary: Vec<String>,
    pub idf: Vec<f32>,
}

// ============================================================================
// TfidfVectorizer
// ============================================================================

/// TF-IDF 벡터라이저
///
/// fit 이후 어휘는 고정됩니다. 쿼리의 미등록 용어는 무시합니다.
pub struct TfidfVectorizer {
    config: TfidfConfig,
    vocabulary: Vec<String>,
    idf: Vec<f32>,
    lookup: HashMap<String, u32>,
    fitted: bool,
}

impl TfidfVectorizer {
    /// fit 전 상태로 생성
    pub fn new(config: TfidfConfig) -> Self {
        Self {
            config,
            vocabulary: Vec::new(),
            idf: Vec::new(),
            lookup: HashMap::new(),
            fitted: false,
        }
    }

    /// 저장된 상태에서 복원
    pub fn from_state(state: TfidfState) -> Result<Self> {
        state.config.validate()?;

        if state.vocabulary.len() != state.idf.len() {
            return Err(RetrievalError::config(format!(
                "TF-IDF state is inconsistent: {} terms, {} idf weights",
                state.vocabulary.len(),
                state.idf.len()
            )));
        }

        let lookup = build_lookup(&state.vocabulary);
        if lookup.len() != state.vocabulary.len() {
            return Err(RetrievalError::config(
                "TF-IDF state contains duplicate vocabulary terms",
            ));
        }

        Ok(Self {
            config: state.config,
            vocabulary: state.vocabulary,
            idf: state.idf,
            lookup,
            fitted: true,
        })
    }

    /// 텍스트에서 용어(n-gram) 목록 추출
    fn terms(&self, text: &str) -> Vec<String> {
        let tokens = tokenize(text, self.config.lowercase);
        ngrams(&tokens, self.config.ngram_min, self.config.ngram_max)
    }

    /// 코퍼스로 어휘/IDF 계산
    fn fit_corpus(&mut self, corpus: &[String]) {
        let n_docs = corpus.len();

        // 문서 빈도
        let mut df: HashMap<String, usize> = HashMap::new();
        for text in corpus {
            let unique: HashSet<String> = self.terms(text).into_iter().collect();
            for term in unique {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        // 가지치기 + 사전순 정렬 (결정적 인덱스)
        let max_doc_count = f64::from(self.config.max_df) * n_docs as f64;
        let kept: BTreeMap<String, usize> = df
            .into_iter()
            .filter(|(_, count)| {
                *count >= self.config.min_df && (*count as f64) <= max_doc_count
            })
            .collect();

        let n = n_docs as f32;
        self.idf = kept
            .values()
            .map(|&count| ((1.0 + n) / (1.0 + count as f32)).ln() + 1.0)
            .collect();
        self.vocabulary = kept.into_keys().collect();
        self.lookup = build_lookup(&self.vocabulary);
        self.fitted = true;

        if self.vocabulary.is_empty() {
            tracing::warn!("TF-IDF vocabulary is empty after fitting {} documents", n_docs);
        } else {
            tracing::debug!(
                "Fitted TF-IDF: {} documents, {} terms",
                n_docs,
                self.vocabulary.len()
            );
        }
    }

    /// 단일 텍스트 변환
    fn vectorize(&self, text: &str) -> Embedding {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for term in self.terms(text) {
            if let Some(&index) = self.lookup.get(&term) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let pairs = counts
            .into_iter()
            .map(|(index, tf)| (index, tf * self.idf[index as usize]))
            .collect();

        Embedding::Sparse(SparseVector::from_pairs(pairs)).normalized()
    }
}

#[async_trait]
impl Vectorizer for TfidfVectorizer {
    async fn fit(&mut self, corpus: &[String]) -> Result<()> {
        self.config.validate()?;
        self.fit_corpus(corpus);
        Ok(())
    }

    async fn transform(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if !self.fitted {
            return Err(RetrievalError::config(
                "TF-IDF vectorizer used before fit; load the fitted state from the index",
            ));
        }
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    fn state(&self) -> VectorizerState {
        VectorizerState::Lexical(TfidfState {
            config: self.config.clone(),
            vocabulary: self.vocabulary.clone(),
            idf: self.idf.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 토큰화 (2자 이상 단어)
pub fn tokenize(text: &str, lowercase: bool) -> Vec<String> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let re = TOKEN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("valid regex"));

    let text = if lowercase {
        text.to_lowercase()
    } else {
        text.to_string()
    };

    re.find_iter(&text).map(|m| m.as_str().to_string()).collect()
}

/// 단어 n-gram 생성 (공백으로 연결)
fn ngrams(tokens: &[String], min_n: usize, max_n: usize) -> Vec<String> {
    let mut out = Vec::new();
    for n in min_n..=max_n {
        if n == 0 || n > tokens.len() {
            continue;
        }
        for window in tokens.windows(n) {
            out.push(window.join(" "));
        }
    }
    out
}

fn build_lookup(vocabulary: &[String]) -> HashMap<String, u32> {
    vocabulary
        .iter()
        .enumerate()
        .map(|(i, term)| (term.clone(), i as u32))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
