//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 페이지별 텍스트를 추출합니다.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;

/// PDF에서 텍스트 추출
///
/// (페이지 번호, 텍스트) 목록을 반환합니다. 페이지 번호는 1부터 시작합니다.
/// 텍스트가 없는 PDF(스캔 문서)는 빈 목록입니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<(u32, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![]);
    }

    Ok(split_pdf_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, page)| (i as u32 + 1, page))
        .collect())
}

/// PDF 텍스트를 페이지별로 분리
///
/// 폼피드(`\x0c`)가 있으면 그대로 나누고 빈 페이지도 번호를 유지합니다.
/// 폼피드가 없으면 `--- Page N ---` 형태의 구분 줄을 시도합니다.
fn split_pdf_pages(text: &str) -> Vec<String> {
    if text.contains('\x0c') {
        let mut pages: Vec<String> = text.split('\x0c').map(str::to_string).collect();
        // 마지막 폼피드 뒤의 꼬리는 페이지가 아님
        if pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        return pages;
    }

    static PAGE_MARKER: OnceLock<Regex> = OnceLock::new();
    let marker = PAGE_MARKER.get_or_init(|| {
        Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$").expect("valid regex")
    });

    if marker.is_match(text) {
        let pages: Vec<String> = marker
            .split(text)
            .map(str::to_string)
            .filter(|s| !s.trim().is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    vec![text.to_string()]
}

// ============================================================================
// Tests
// ============================================================================
