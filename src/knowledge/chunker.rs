//! Text Chunking Module
//!
//! 문단(빈 줄) 경계를 존중하는 텍스트 분할을 제공합니다.
//! 짧은 문단은 `min_len`에 도달할 때까지 합치고, `max_len`을 넘는 버퍼는 잘라냅니다.
//!
//! 길이는 바이트가 아닌 문자(char) 단위로 셉니다.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 이 길이 미만의 버퍼는 다음 문단과 합침 (문자 수)
    pub min_len: usize,
    /// 최대 청크 크기 (문자 수)
    pub max_len: usize,
    /// 이보다 짧은 청크는 노이즈로 버림 (문자 수)
    pub min_keep_len: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_len: 250,
            max_len: 1400,
            min_keep_len: 80,
        }
    }
}

impl ChunkConfig {
    /// PDF 페이지 인덱싱용 설정 (짧은 조각을 더 엄격하게 제거)
    pub fn for_pdf() -> Self {
        Self {
            min_keep_len: 120,
            ..Self::default()
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.max_len == 0 {
            return Err(RetrievalError::config("chunk.max_len must be greater than 0"));
        }
        if self.min_len > self.max_len {
            return Err(RetrievalError::config(format!(
                "chunk.min_len ({}) must not exceed chunk.max_len ({})",
                self.min_len, self.max_len
            )));
        }
        if self.min_keep_len > self.max_len {
            return Err(RetrievalError::config(format!(
                "chunk.min_keep_len ({}) must not exceed chunk.max_len ({})",
                self.min_keep_len, self.max_len
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// ParagraphChunker
// ============================================================================

/// 문단 인식 청커
///
/// 같은 입력에는 항상 같은 청크 시퀀스를 반환합니다.
/// 인덱스 위치(청크 ID)가 이 결정성에 의존합니다.
pub struct ParagraphChunker {
    config: ChunkConfig,
}

impl ParagraphChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// 설정 반환
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 빈 줄 기준으로 문단 블록 분할
    fn split_blocks(text: &str) -> Vec<&str> {
        static BLANK_LINE: OnceLock<Regex> = OnceLock::new();
        let re = BLANK_LINE.get_or_init(|| Regex::new(r"\n\s*\n+").expect("valid regex"));

        re.split(text)
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .collect()
    }

    /// 청크 후보를 출력 목록에 추가 (min_keep_len 미만은 버림)
    fn emit(&self, chunks: &mut Vec<String>, piece: &str) {
        let piece = piece.trim();
        if !piece.is_empty() && char_len(piece) >= self.config.min_keep_len {
            chunks.push(piece.to_string());
        }
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let max_len = self.config.max_len;
        let mut chunks = Vec::new();
        let mut buf = String::new();

        for block in Self::split_blocks(text) {
            if buf.is_empty() {
                buf.push_str(block);
                continue;
            }

            let len = char_len(&buf);

            // 버퍼가 너무 짧으면 합치기
            if len < self.config.min_len {
                buf.push_str("\n\n");
                buf.push_str(block);
                continue;
            }

            // 버퍼가 너무 길면 앞부분만 내보내고 나머지는 다음 문단과 합침
            if len > max_len {
                let (head, tail) = split_at_char(&buf, max_len);
                self.emit(&mut chunks, head);

                let tail = tail.trim();
                buf = if tail.is_empty() {
                    block.to_string()
                } else {
                    format!("{}\n\n{}", tail, block)
                };
                continue;
            }

            // 정상 크기: 청크 확정 후 새 버퍼 시작
            self.emit(&mut chunks, &buf);
            buf = block.to_string();
        }

        // 남은 버퍼는 max_len 단위로 잘라서 내보냄
        let mut rest = buf.as_str();
        while char_len(rest) > max_len {
            let (head, tail) = split_at_char(rest, max_len);
            self.emit(&mut chunks, head);
            rest = tail;
        }
        self.emit(&mut chunks, rest);

        chunks
    }

    fn name(&self) -> &'static str {
        "ParagraphChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문자 수
#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 앞에서 `n`개 문자 지점에서 분할 (UTF-8 경계 안전)
#[inline]
fn split_at_char(s: &str, n: usize) -> (&str, &str) {
    let index = s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len());
    s.split_at(index)
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(ParagraphChunker::with_defaults())
}

/// 문단 청커 생성 (설정 지정)
pub fn paragraph_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(ParagraphChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================
