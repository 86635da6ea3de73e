//! 파일 수집 모듈
//!
//! 코퍼스 폴더에서 인덱싱할 문서를 수집하고, 코퍼스 시그니처를 계산합니다.
//! .gitignore 패턴을 존중하고, 지원하는 확장자(txt, md, pdf)만 수집합니다.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};

use crate::knowledge::SourcePage;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 텍스트 파일 (txt, md)
    Text,
    /// PDF 파일
    Pdf,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        match ext.as_str() {
            "txt" | "md" | "markdown" => Some(FileType::Text),
            "pdf" => Some(FileType::Pdf),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 절대 경로
    pub path: PathBuf,
    /// 코퍼스 안에서의 이름 (루트 기준 상대 경로)
    pub name: String,
    /// 파일 타입
    pub file_type: FileType,
    /// 파일 크기 (바이트)
    pub size: u64,
    /// 수정 시간
    pub modified_at: Option<SystemTime>,
}

impl CollectedFile {
    /// 파일에서 CollectedFile 생성
    ///
    /// `root`가 있으면 그 기준 상대 경로를 이름으로 사용합니다.
    pub fn from_path(path: PathBuf, root: Option<&Path>) -> Result<Option<Self>> {
        let file_type = match FileType::from_path(&path) {
            Some(ft) => ft,
            None => return Ok(None),
        };

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        let name = display_name(&path, root);

        Ok(Some(Self {
            path,
            name,
            file_type,
            size: metadata.len(),
            modified_at: metadata.modified().ok(),
        }))
    }

    /// 수정 시간 (UNIX 초)
    pub fn modified_secs(&self) -> u64 {
        self.modified_at
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

fn display_name(path: &Path, root: Option<&Path>) -> String {
    let relative = root
        .and_then(|r| path.strip_prefix(r).ok())
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| path.file_name().map(Path::new))
        .unwrap_or(path);

    // 플랫폼과 무관한 이름 (시그니처 안정성)
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
    /// 특정 확장자만 수집 (비어있으면 모든 지원 확장자)
    pub extensions: Vec<String>,
    /// PDF 파일 건너뛰기
    pub skip_pdfs: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 50 * 1024 * 1024, // 50MB (법령 PDF 묶음)
            extensions: vec![],
            skip_pdfs: false,
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 새 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 단일 파일 수집
    pub fn collect_file(&self, path: &Path) -> Result<Option<CollectedFile>> {
        let abs_path = absolute(path)?;

        if !abs_path.exists() {
            anyhow::bail!("File not found: {:?}", abs_path);
        }

        if !abs_path.is_file() {
            anyhow::bail!("Not a file: {:?}", abs_path);
        }

        let file = CollectedFile::from_path(abs_path, None)?;

        if let Some(ref file) = file {
            if !self.should_include(file) {
                return Ok(None);
            }
        }

        Ok(file)
    }

    /// 폴더 재귀 수집 (이름순 정렬)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        let abs_path = absolute(path)?;

        if !abs_path.exists() {
            anyhow::bail!("Directory not found: {:?}", abs_path);
        }

        if !abs_path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", abs_path);
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(&abs_path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedFile::from_path(entry.path().to_path_buf(), Some(&abs_path)) {
                Ok(Some(file)) => {
                    if self.should_include(&file) {
                        files.push(file);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Failed to collect file: {}", e);
                }
            }
        }

        // 청크 ID가 입력 순서에 의존하므로 순서를 고정
        files.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::info!("Collected {} files from {:?}", files.len(), abs_path);
        Ok(files)
    }

    /// 파일이 필터 조건을 만족하는지 확인
    fn should_include(&self, file: &CollectedFile) -> bool {
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            tracing::warn!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
            return false;
        }

        if self.config.skip_pdfs && file.file_type == FileType::Pdf {
            return false;
        }

        if !self.config.extensions.is_empty() {
            match file.path.extension().and_then(|e| e.to_str()) {
                Some(ext) => {
                    if !self
                        .config
                        .extensions
                        .iter()
                        .any(|e| e.eq_ignore_ascii_case(ext))
                    {
                        return false;
                    }
                }
                None => return false,
            }
        }

        true
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

// ============================================================================
// Corpus Signature
// ============================================================================

/// 파일 목록의 코퍼스 시그니처
///
/// (이름, 크기, 수정 시각)을 이름순으로 해시합니다. 파일 내용은 읽지 않습니다.
pub fn corpus_signature(files: &[CollectedFile]) -> String {
    let mut entries: Vec<(&str, u64, u64)> = files
        .iter()
        .map(|f| (f.name.as_str(), f.size, f.modified_secs()))
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (name, size, modified) in entries {
        hasher.update(format!("{}\t{}\t{}\n", name, size, modified).as_bytes());
    }
    hex(&hasher.finalize())
}

/// 메모리 페이지 목록의 코퍼스 시그니처 (입력 순서 반영)
pub fn signature_from_pages(pages: &[SourcePage]) -> String {
    let mut hasher = Sha256::new();
    for page in pages {
        hasher.update(page.source.as_bytes());
        hasher.update([0u8]);
        hasher.update(page.page.to_le_bytes());
        hasher.update((page.text.len() as u64).to_le_bytes());
        hasher.update(page.text.as_bytes());
    }
    hex(&hasher.finalize())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub text_files: usize,
    pub pdf_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    /// 수집된 파일 목록에서 통계 계산
    pub fn from_files(files: &[CollectedFile]) -> Self {
        let mut stats = Self::default();

        for file in files {
            stats.total_files += 1;
            stats.total_size += file.size;

            match file.file_type {
                FileType::Text => stats.text_files += 1,
                FileType::Pdf => stats.pdf_files += 1,
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn corpus_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "Kira geliri").unwrap();
        std::fs::write(dir.path().join("a.md"), "# KDV").unwrap();
        std::fs::write(dir.path().join("notes.exe"), "binary").unwrap();
        std::fs::create_dir(dir.path().join("alt")).unwrap();
        std::fs::write(dir.path().join("alt").join("c.txt"), "Damga vergisi").unwrap();
        dir
    }

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("md"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("TXT"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("rs"), None);
        assert_eq!(FileType::from_extension("exe"), None);
    }

    #[test]
    fn test_collector_config_default() {
        let config = CollectorConfig::default();
        assert!(config.respect_gitignore);
        assert!(!config.include_hidden);
        assert!(!config.skip_pdfs);
    }

    #[test]
    fn test_collect_directory_sorted_relative_names() {
        let dir = corpus_dir();
        let files = FileCollector::with_defaults()
            .collect_directory(dir.path())
            .unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.md", "alt/c.txt", "b.txt"]);

        let stats = CollectionStats::from_files(&files);
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.text_files, 3);
        assert_eq!(stats.pdf_files, 0);
    }

    #[test]
    fn test_collect_file_uses_file_name() {
        let dir = corpus_dir();
        let file = FileCollector::with_defaults()
            .collect_file(&dir.path().join("b.txt"))
            .unwrap()
            .unwrap();
        assert_eq!(file.name, "b.txt");
        assert_eq!(file.size, "Kira geliri".len() as u64);

        let skipped = FileCollector::with_defaults()
            .collect_file(&dir.path().join("notes.exe"))
            .unwrap();
        assert!(skipped.is_none());
    }

    #[test]
    fn test_extension_filter() {
        let dir = corpus_dir();
        let collector = FileCollector::new(CollectorConfig {
            extensions: vec!["md".into()],
            ..Default::default()
        });
        let files = collector.collect_directory(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.md");
    }

    #[test]
    fn test_corpus_signature_changes_with_content() {
        let dir = corpus_dir();
        let collector = FileCollector::with_defaults();

        let first = corpus_signature(&collector.collect_directory(dir.path()).unwrap());
        let again = corpus_signature(&collector.collect_directory(dir.path()).unwrap());
        assert_eq!(first, again);
        assert_eq!(first.len(), 64);

        std::fs::write(dir.path().join("d.txt"), "Yeni belge").unwrap();
        let changed = corpus_signature(&collector.collect_directory(dir.path()).unwrap());
        assert_ne!(first, changed);
    }

    #[test]
    fn test_signature_from_pages() {
        let a = vec![SourcePage::new("a.pdf", 1, "metin")];
        let b = vec![SourcePage::new("a.pdf", 2, "metin")];
        assert_eq!(signature_from_pages(&a), signature_from_pages(&a));
        assert_ne!(signature_from_pages(&a), signature_from_pages(&b));
    }
}
