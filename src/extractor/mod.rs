//! 콘텐츠 추출 모듈
//!
//! 수집된 파일을 인덱서 입력(`SourcePage`)으로 변환합니다.
//! - 텍스트 파일: 파일 전체가 1페이지
//! - PDF 파일: pdf-extract로 페이지별 추출
//!
//! 모든 페이지는 공백 정규화(`[ \t]+` → 공백 하나, 양끝 trim) 후
//! 비어 있으면 건너뜁니다.

pub mod pdf;

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::collector::{CollectedFile, FileType};

pub use crate::knowledge::SourcePage;

// ============================================================================
// Content Extractor
// ============================================================================

/// 콘텐츠 추출기
#[derive(Debug, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 수집된 파일에서 페이지 추출
    pub async fn extract(&self, file: &CollectedFile) -> Result<Vec<SourcePage>> {
        let raw_pages = match file.file_type {
            FileType::Text => self.extract_text(&file.path).await?,
            FileType::Pdf => self.extract_pdf(&file.path).await?,
        };

        let pages = into_source_pages(&file.name, raw_pages);
        tracing::debug!("Extracted {} pages from {}", pages.len(), file.name);
        Ok(pages)
    }

    /// 여러 파일에서 페이지 추출 (입력 순서 유지)
    ///
    /// 읽지 못한 파일은 경고 후 건너뜁니다.
    pub async fn extract_all(&self, files: &[CollectedFile]) -> Vec<SourcePage> {
        let mut pages = Vec::new();
        for file in files {
            match self.extract(file).await {
                Ok(extracted) => pages.extend(extracted),
                Err(e) => tracing::warn!("Skipping {}: {:#}", file.name, e),
            }
        }
        pages
    }

    /// 텍스트 파일에서 추출
    async fn extract_text(&self, path: &Path) -> Result<Vec<(u32, String)>> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read text file: {:?}", path))?;
        Ok(vec![(1, text)])
    }

    /// PDF 파일에서 추출
    async fn extract_pdf(&self, path: &Path) -> Result<Vec<(u32, String)>> {
        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&path))
            .await
            .context("PDF extraction task failed")?
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 페이지 텍스트 정규화 (줄바꿈은 유지)
pub fn normalize_page_text(text: &str) -> String {
    static INLINE_SPACE: OnceLock<Regex> = OnceLock::new();
    let re = INLINE_SPACE.get_or_init(|| Regex::new(r"[ \t]+").expect("valid regex"));
    re.replace_all(text, " ").trim().to_string()
}

/// (페이지 번호, 원문) 목록을 SourcePage로 변환 (빈 페이지 제외)
pub fn into_source_pages(source: &str, raw_pages: Vec<(u32, String)>) -> Vec<SourcePage> {
    raw_pages
        .into_iter()
        .filter_map(|(page, text)| {
            let text = normalize_page_text(&text);
            (!text.is_empty()).then(|| SourcePage::new(source, page, text))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::FileCollector;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_page_text() {
        assert_eq!(
            normalize_page_text("  Madde\t 1 -   Kira\n\n geliri  "),
            "Madde 1 - Kira\n\n geliri"
        );
        assert_eq!(normalize_page_text(" \t "), "");
    }

    #[test]
    fn test_empty_pages_are_skipped() {
        let pages = into_source_pages(
            "kanun.pdf",
            vec![(1, "Birinci sayfa".into()), (2, "  \t ".into()), (3, "Üçüncü".into())],
        );
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page, 1);
        assert_eq!(pages[1].page, 3);
        assert_eq!(pages[1].source, "kanun.pdf");
    }

    #[tokio::test]
    async fn test_extract_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rehber.txt");
        std::fs::write(&path, "Gelir   vergisi\n\nRehberi").unwrap();

        let file = FileCollector::with_defaults()
            .collect_file(&path)
            .unwrap()
            .unwrap();
        let pages = ContentExtractor::new().extract(&file).await.unwrap();

        assert_eq!(pages, vec![SourcePage::new("rehber.txt", 1, "Gelir vergisi\n\nRehberi")]);
    }

    #[tokio::test]
    async fn test_extract_all_skips_unreadable() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ok.txt"), "Geçerli metin").unwrap();
        std::fs::write(dir.path().join("bad.pdf"), "not a pdf").unwrap();

        let files = FileCollector::with_defaults()
            .collect_directory(dir.path())
            .unwrap();
        let pages = ContentExtractor::new().extract_all(&files).await;

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].source, "ok.txt");
    }
}
