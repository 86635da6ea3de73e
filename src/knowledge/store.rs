//! Index Store - rusqlite 기반 인덱스 영속화
//!
//! 인덱스 하나를 SQLite 파일 하나로 저장합니다.
//! 저장 위치: ~/.mevzuat-rag/index.db
//!
//! 쓰기는 같은 디렉토리의 스테이징 파일에 한 트랜잭션으로 기록한 뒤
//! `rename`으로 교체합니다. 동시에 읽는 쪽은 항상 이전 인덱스 전체 또는
//! 새 인덱스 전체만 보게 됩니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use uuid::Uuid;

use crate::error::{Result, RetrievalError};
use crate::vectorizer::VectorizerState;

use super::chunker::ChunkConfig;
use super::index::{Chunk, Index, IndexMetadata};
use super::vector::Embedding;

/// 기본 인덱스 파일 이름
pub const INDEX_FILE_NAME: &str = "index.db";

const SCHEMA: &str = r#"
CREATE TABLE meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE chunks (
    id INTEGER PRIMARY KEY,
    source TEXT NOT NULL,
    page INTEGER NOT NULL,
    text TEXT NOT NULL
);

CREATE TABLE vectors (
    chunk_id INTEGER PRIMARY KEY REFERENCES chunks(id),
    data BLOB NOT NULL
);
"#;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.mevzuat-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mevzuat-rag")
}

// ============================================================================
// IndexStore
// ============================================================================

/// 인덱스 파일 저장소
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    /// 경로로 생성 (파일은 write 시점에 생김)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 데이터 디렉토리 안의 기본 인덱스
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(INDEX_FILE_NAME))
    }

    /// 인덱스 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 인덱스 파일 존재 여부
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// 인덱스를 원자적으로 저장
    ///
    /// 실패하면 기존 인덱스는 그대로 남고 스테이징 파일은 삭제됩니다.
    pub fn write(&self, index: &Index) -> Result<()> {
        index.validate()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let staging = self.staging_path();
        tracing::debug!("Writing index to staging file {:?}", staging);

        let result = write_database(&staging, index)
            .and_then(|_| std::fs::rename(&staging, &self.path).map_err(RetrievalError::from));

        if let Err(e) = result {
            remove_staging(&staging);
            return Err(e);
        }

        tracing::info!(
            "Index written to {:?} ({} chunks, dimension {})",
            self.path,
            index.len(),
            index.metadata.vector_dimension
        );
        Ok(())
    }

    /// 인덱스 전체 로드 + 검증
    ///
    /// 파일이 없거나 손상됐으면 ConfigurationError
    pub fn read(&self) -> Result<Index> {
        let conn = self.open_read_only()?;

        let meta = read_meta(&conn)?;
        let metadata = parse_metadata(&meta)?;
        let state_json = require(&meta, "vectorizer_state")?;
        let vectorizer_state: VectorizerState = serde_json::from_str(state_json)
            .map_err(|e| corrupt(format!("invalid vectorizer state: {}", e)))?;

        let chunks = read_chunks(&conn)?;
        let vectors = read_vectors(&conn)?;

        let index = Index {
            chunks,
            vectors,
            vectorizer_state,
            metadata,
        };
        index.validate()?;

        tracing::debug!("Loaded index from {:?} ({} chunks)", self.path, index.len());
        Ok(index)
    }

    /// 메타데이터만 로드 (재빌드 판단, status 출력용)
    pub fn read_metadata(&self) -> Result<IndexMetadata> {
        let conn = self.open_read_only()?;
        let meta = read_meta(&conn)?;
        parse_metadata(&meta)
    }

    /// 인덱스 파일 삭제
    pub fn remove(&self) -> Result<bool> {
        if !self.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)?;
        Ok(true)
    }

    fn staging_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| INDEX_FILE_NAME.to_string());
        self.path
            .with_file_name(format!(".{}.{}.staging", file_name, Uuid::new_v4()))
    }

    fn open_read_only(&self) -> Result<Connection> {
        if !self.exists() {
            return Err(RetrievalError::config(format!(
                "index not found at {}; build it first",
                self.path.display()
            )));
        }

        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| corrupt(format!("failed to open {}: {}", self.path.display(), e)))
    }
}

// ============================================================================
// Write Helpers
// ============================================================================

fn write_database(path: &Path, index: &Index) -> Result<()> {
    let mut conn = Connection::open(path)?;
    let tx = conn.transaction()?;

    tx.execute_batch(SCHEMA)?;

    {
        let mut stmt = tx.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;
        for (key, value) in metadata_entries(index)? {
            stmt.execute(params![key, value])?;
        }
    }

    {
        let mut stmt =
            tx.prepare("INSERT INTO chunks (id, source, page, text) VALUES (?1, ?2, ?3, ?4)")?;
        for chunk in &index.chunks {
            stmt.execute(params![
                chunk.id as i64,
                chunk.source,
                chunk.page as i64,
                chunk.text
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare("INSERT INTO vectors (chunk_id, data) VALUES (?1, ?2)")?;
        for (id, vector) in index.vectors.iter().enumerate() {
            stmt.execute(params![id as i64, vector.to_bytes()])?;
        }
    }

    tx.commit()?;
    conn.close().map_err(|(_, e)| RetrievalError::from(e))?;
    Ok(())
}

fn metadata_entries(index: &Index) -> Result<Vec<(&'static str, String)>> {
    let meta = &index.metadata;
    Ok(vec![
        ("format_version", meta.format_version.to_string()),
        ("record_count", meta.record_count.to_string()),
        ("vector_dimension", meta.vector_dimension.to_string()),
        ("vectorizer_identity", meta.vectorizer_identity.clone()),
        ("corpus_signature", meta.corpus_signature.clone()),
        ("source_count", meta.source_count.to_string()),
        ("chunk_config", serde_json::to_string(&meta.chunk_config)?),
        ("built_at", meta.built_at.to_rfc3339()),
        (
            "vectorizer_state",
            serde_json::to_string(&index.vectorizer_state)?,
        ),
    ])
}

fn remove_staging(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove staging file {:?}: {}", path, e);
        }
    }
}

// ============================================================================
// Read Helpers
// ============================================================================

/// 손상된 인덱스는 재빌드가 필요한 설정 문제로 보고
fn corrupt(detail: impl std::fmt::Display) -> RetrievalError {
    RetrievalError::config(format!("index file is unreadable ({}); rebuild it", detail))
}

fn read_meta(conn: &Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM meta")
        .map_err(corrupt)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(corrupt)?;

    let mut meta = HashMap::new();
    for row in rows {
        let (key, value) = row.map_err(corrupt)?;
        meta.insert(key, value);
    }
    Ok(meta)
}

fn require<'a>(meta: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    meta.get(key)
        .map(String::as_str)
        .ok_or_else(|| corrupt(format!("missing metadata key '{}'", key)))
}

fn parse_number<T: std::str::FromStr>(meta: &HashMap<String, String>, key: &str) -> Result<T> {
    require(meta, key)?
        .parse()
        .map_err(|_| corrupt(format!("metadata key '{}' is not a number", key)))
}

fn parse_metadata(meta: &HashMap<String, String>) -> Result<IndexMetadata> {
    let chunk_config: ChunkConfig = serde_json::from_str(require(meta, "chunk_config")?)
        .map_err(|e| corrupt(format!("invalid chunk config: {}", e)))?;
    let built_at = DateTime::parse_from_rfc3339(require(meta, "built_at")?)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(format!("invalid build timestamp: {}", e)))?;

    Ok(IndexMetadata {
        format_version: parse_number(meta, "format_version")?,
        record_count: parse_number(meta, "record_count")?,
        vector_dimension: parse_number(meta, "vector_dimension")?,
        vectorizer_identity: require(meta, "vectorizer_identity")?.to_string(),
        corpus_signature: require(meta, "corpus_signature")?.to_string(),
        source_count: parse_number(meta, "source_count")?,
        chunk_config,
        built_at,
    })
}

fn read_chunks(conn: &Connection) -> Result<Vec<Chunk>> {
    let mut stmt = conn
        .prepare("SELECT id, source, page, text FROM chunks ORDER BY id")
        .map_err(corrupt)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(corrupt)?;

    let mut chunks = Vec::new();
    for row in rows {
        let (id, source, page, text) = row.map_err(corrupt)?;
        let id = usize::try_from(id).map_err(|_| corrupt(format!("negative chunk id {}", id)))?;
        let page = u32::try_from(page).map_err(|_| corrupt(format!("invalid page {}", page)))?;
        chunks.push(Chunk {
            id,
            source,
            page,
            text,
        });
    }
    Ok(chunks)
}

fn read_vectors(conn: &Connection) -> Result<Vec<Embedding>> {
    let mut stmt = conn
        .prepare("SELECT chunk_id, data FROM vectors ORDER BY chunk_id")
        .map_err(corrupt)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)))
        .map_err(corrupt)?;

    let mut vectors = Vec::new();
    for (position, row) in rows.enumerate() {
        let (chunk_id, data) = row.map_err(corrupt)?;
        if chunk_id != position as i64 {
            return Err(corrupt(format!(
                "vector for chunk {} found at position {}",
                chunk_id, position
            )));
        }
        vectors.push(Embedding::from_bytes(&data)?);
    }
    Ok(vectors)
}

// ============================================================================
// Tests
// ============================================================================
