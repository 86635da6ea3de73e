//! Index Cache - 프로세스 전역 인덱스 캐시
//!
//! 인덱스를 한 번 로드하면 `Arc<Index>`로 모든 쿼리가 공유합니다.
//! 코퍼스 시그니처가 바뀌었거나 같은 경로에 새 인덱스가 기록됐을 때만 다시 읽습니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{Result, RetrievalError};

use super::index::Index;
use super::store::IndexStore;

struct CachedIndex {
    path: PathBuf,
    index: Arc<Index>,
}

/// 인덱스 캐시
#[derive(Default)]
pub struct IndexCache {
    slot: RwLock<Option<CachedIndex>>,
}

impl IndexCache {
    /// 빈 캐시 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 프로세스 전역 캐시
    pub fn global() -> &'static IndexCache {
        static CACHE: OnceLock<IndexCache> = OnceLock::new();
        CACHE.get_or_init(IndexCache::new)
    }

    /// 캐시된 인덱스 반환 (없으면 디스크에서 로드)
    ///
    /// `expected_signature`가 주어지면 캐시와 디스크 모두 그 시그니처와 일치해야 합니다.
    /// 디스크 인덱스도 다르면 ConfigurationError (재빌드 필요).
    pub fn get_or_load(
        &self,
        store: &IndexStore,
        expected_signature: Option<&str>,
    ) -> Result<Arc<Index>> {
        if let Some(index) = self.lookup(store.path(), expected_signature) {
            tracing::debug!("Index cache hit for {:?}", store.path());
            return Ok(index);
        }

        let index = Arc::new(store.read()?);

        if let Some(expected) = expected_signature {
            if index.corpus_signature() != expected {
                return Err(RetrievalError::config(format!(
                    "index at {} is stale: built from corpus {} but the corpus is now {}; rebuild the index",
                    store.path().display(),
                    index.corpus_signature(),
                    expected
                )));
            }
        }

        {
            let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
            *slot = Some(CachedIndex {
                path: store.path().to_path_buf(),
                index: Arc::clone(&index),
            });
        }

        tracing::info!(
            "Loaded index {:?} ({} chunks, signature {})",
            store.path(),
            index.len(),
            index.corpus_signature()
        );
        Ok(index)
    }

    /// 첫 쿼리 전에 미리 로드
    pub fn warmup(&self, store: &IndexStore) -> Result<Arc<Index>> {
        self.get_or_load(store, None)
    }

    /// 캐시 비우기
    pub fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    /// 해당 경로의 인덱스가 캐시돼 있으면 비우기
    pub fn invalidate_path(&self, path: &Path) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|cached| cached.path == path) {
            tracing::debug!("Invalidating cached index for {:?}", path);
            *slot = None;
        }
    }

    /// 캐시된 인덱스의 코퍼스 시그니처
    pub fn current_signature(&self) -> Option<String> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        slot.as_ref()
            .map(|cached| cached.index.corpus_signature().to_string())
    }

    fn lookup(&self, path: &Path, expected_signature: Option<&str>) -> Option<Arc<Index>> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        let cached = slot.as_ref()?;

        if cached.path != path {
            return None;
        }
        match expected_signature {
            Some(expected) if cached.index.corpus_signature() != expected => None,
            _ => Some(Arc::clone(&cached.index)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
