//! PDF cache metadata store (C6).
//!
//! Content-addressed storage: bytes live on disk sharded by SHA-256 hash
//! (`<root>/<hash[0:2]>/<hash[2:4]>/<hash>.pdf`), the same content shared
//! by multiple identifiers is stored once, and this table tracks the
//! identifier -> hash mapping plus LRU bookkeeping.

use std::path::{Path, PathBuf};

use chrono::Utc;
use kg_core::SourceType;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

/// Metadata row for one cached identifier (§3 "PDF cache entry").
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PdfCacheEntry {
    pub identifier: String,
    pub content_hash: String,
    pub file_path: String,
    pub byte_size: i64,
    pub source: String,
    pub downloaded_at: String,
    pub last_accessed_at: String,
}

/// Cache statistics (§4.6 plus the derived `hit_rate`/`total_size_mb`/
/// `item_count` fields computed on read).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    pub total_size: i64,
    pub hits: i64,
    pub misses: i64,
    pub item_count: i64,
    pub hit_rate: f64,
    pub total_size_mb: f64,
}

/// Content-addressed PDF store with SQLite metadata and LRU eviction (C6).
#[derive(Clone)]
pub struct PdfCacheStore {
    pool: SqlitePool,
    pdf_root: PathBuf,
    max_size_bytes: u64,
}

impl PdfCacheStore {
    pub fn new(pool: SqlitePool, pdf_root: PathBuf, max_size_bytes: u64) -> Self {
        Self {
            pool,
            pdf_root,
            max_size_bytes,
        }
    }

    fn hash_path(&self, content_hash: &str) -> PathBuf {
        self.pdf_root
            .join(&content_hash[0..2])
            .join(&content_hash[2..4])
            .join(format!("{content_hash}.pdf"))
    }

    /// Store `content` under `identifier`, deduplicating by content hash.
    /// Runs eviction afterwards if the cache now exceeds `max_size_bytes`.
    pub async fn store(
        &self,
        identifier: &str,
        content: &[u8],
        source: SourceType,
    ) -> DbResult<PathBuf> {
        let content_hash = format!("{:x}", Sha256::digest(content));
        let file_path = self.hash_path(&content_hash);
        let byte_size = content.len() as i64;

        if !file_path.exists() {
            if let Some(parent) = file_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&file_path, content).await?;
            self.update_total_size(byte_size).await?;
        }

        let now = Utc::now().to_rfc3339();

        let existing: Option<(String, i64)> = sqlx::query_as(
            "SELECT content_hash, byte_size FROM pdf_cache WHERE identifier = ?",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((existing_hash, existing_size)) = &existing {
            if existing_hash != &content_hash {
                self.update_total_size(-existing_size).await?;
            }
        }

        sqlx::query(
            "INSERT INTO pdf_cache
                (identifier, content_hash, file_path, byte_size, source, downloaded_at, last_accessed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(identifier) DO UPDATE SET
                content_hash = excluded.content_hash,
                file_path = excluded.file_path,
                byte_size = excluded.byte_size,
                source = excluded.source,
                downloaded_at = excluded.downloaded_at,
                last_accessed_at = excluded.last_accessed_at",
        )
        .bind(identifier)
        .bind(&content_hash)
        .bind(file_path.to_string_lossy().to_string())
        .bind(byte_size)
        .bind(source.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.maybe_evict().await?;

        Ok(file_path)
    }

    /// Read the cached bytes for `identifier`, updating LRU bookkeeping and
    /// hit/miss counters. A metadata row pointing at a missing file is
    /// treated as a miss and removed.
    pub async fn get(&self, identifier: &str) -> DbResult<Option<Vec<u8>>> {
        match self.touch(identifier).await? {
            Some(path) => {
                let bytes = tokio::fs::read(&path).await?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    /// Like [`Self::get`] but returns the on-disk path instead of reading it.
    pub async fn get_path(&self, identifier: &str) -> DbResult<Option<PathBuf>> {
        self.touch(identifier).await
    }

    /// Resolve the current file path for `identifier`, updating
    /// `last_accessed_at` and the hit/miss counters. Shared by `get` and
    /// `get_path` so both update LRU state identically.
    async fn touch(&self, identifier: &str) -> DbResult<Option<PathBuf>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT file_path FROM pdf_cache WHERE identifier = ?")
                .bind(identifier)
                .fetch_optional(&self.pool)
                .await?;

        let Some((file_path,)) = row else {
            self.record_miss().await?;
            return Ok(None);
        };

        let path = PathBuf::from(&file_path);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            sqlx::query("DELETE FROM pdf_cache WHERE identifier = ?")
                .bind(identifier)
                .execute(&self.pool)
                .await?;
            self.record_miss().await?;
            return Ok(None);
        }

        sqlx::query("UPDATE pdf_cache SET last_accessed_at = ? WHERE identifier = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(identifier)
            .execute(&self.pool)
            .await?;

        self.record_hit().await?;
        Ok(Some(path))
    }

    /// Check for presence without affecting hit/miss counters or LRU order.
    pub async fn has(&self, identifier: &str) -> DbResult<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT file_path FROM pdf_cache WHERE identifier = ?")
                .bind(identifier)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((file_path,)) => Ok(tokio::fs::try_exists(&file_path).await.unwrap_or(false)),
            None => Ok(false),
        }
    }

    pub async fn metadata(&self, identifier: &str) -> DbResult<Option<PdfCacheEntry>> {
        let row = sqlx::query_as::<_, PdfCacheEntry>(
            "SELECT identifier, content_hash, file_path, byte_size, source, downloaded_at, last_accessed_at
             FROM pdf_cache WHERE identifier = ?",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Remove `identifier`'s row. The underlying file is only deleted when
    /// no other identifier still references the same content hash.
    pub async fn delete(&self, identifier: &str) -> DbResult<bool> {
        let row: Option<(String, String, i64)> = sqlx::query_as(
            "SELECT content_hash, file_path, byte_size FROM pdf_cache WHERE identifier = ?",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        let Some((content_hash, file_path, byte_size)) = row else {
            return Ok(false);
        };

        let (refcount,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pdf_cache WHERE content_hash = ?")
                .bind(&content_hash)
                .fetch_one(&self.pool)
                .await?;

        sqlx::query("DELETE FROM pdf_cache WHERE identifier = ?")
            .bind(identifier)
            .execute(&self.pool)
            .await?;

        if refcount <= 1 {
            let path = Path::new(&file_path);
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                tokio::fs::remove_file(path).await?;
            }
            self.update_total_size(-byte_size).await?;
        }

        Ok(true)
    }

    /// Drop every cache entry and remove all PDF files on disk.
    pub async fn clear(&self) -> DbResult<()> {
        sqlx::query("DELETE FROM pdf_cache").execute(&self.pool).await?;
        sqlx::query("UPDATE cache_stats SET value = 0 WHERE key = 'total_size'")
            .execute(&self.pool)
            .await?;

        if tokio::fs::try_exists(&self.pdf_root).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&self.pdf_root).await?;
        }
        tokio::fs::create_dir_all(&self.pdf_root).await?;
        Ok(())
    }

    pub async fn stats(&self) -> DbResult<CacheStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT key, value FROM cache_stats")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = CacheStats::default();
        for (key, value) in rows {
            match key.as_str() {
                "total_size" => stats.total_size = value,
                "hits" => stats.hits = value,
                "misses" => stats.misses = value,
                _ => {}
            }
        }

        let (item_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pdf_cache")
            .fetch_one(&self.pool)
            .await?;
        stats.item_count = item_count;

        let total_requests = stats.hits + stats.misses;
        stats.hit_rate = if total_requests > 0 {
            stats.hits as f64 / total_requests as f64
        } else {
            0.0
        };
        stats.total_size_mb = stats.total_size as f64 / (1024.0 * 1024.0);

        Ok(stats)
    }

    async fn update_total_size(&self, delta: i64) -> DbResult<()> {
        sqlx::query("UPDATE cache_stats SET value = MAX(0, value + ?) WHERE key = 'total_size'")
            .bind(delta)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_hit(&self) -> DbResult<()> {
        sqlx::query("UPDATE cache_stats SET value = value + 1 WHERE key = 'hits'")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_miss(&self) -> DbResult<()> {
        sqlx::query("UPDATE cache_stats SET value = value + 1 WHERE key = 'misses'")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Evict LRU entries until `total_size <= 0.8 * max_size_bytes` (§4.6).
    async fn maybe_evict(&self) -> DbResult<()> {
        let (current_size,): (i64,) =
            sqlx::query_as("SELECT value FROM cache_stats WHERE key = 'total_size'")
                .fetch_one(&self.pool)
                .await?;

        if current_size as u64 <= self.max_size_bytes {
            return Ok(());
        }

        let target_size = (self.max_size_bytes as f64 * 0.8) as i64;

        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT identifier, byte_size FROM pdf_cache ORDER BY last_accessed_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut evicted_size: i64 = 0;
        let mut to_delete = Vec::new();
        for (identifier, byte_size) in rows {
            if current_size - evicted_size <= target_size {
                break;
            }
            to_delete.push(identifier);
            evicted_size += byte_size;
        }

        let evicted_count = to_delete.len();
        for identifier in &to_delete {
            self.delete(identifier).await?;
            debug!(identifier, "evicted from PDF cache");
        }

        if evicted_count > 0 {
            info!(evicted_count, evicted_size, "evicted items from PDF cache");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_db::CacheDbPool;

    async fn store(max_size_bytes: u64) -> (PdfCacheStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = CacheDbPool::open_in_memory().await.unwrap();
        let pdf_root = dir.path().join("pdfs");
        (
            PdfCacheStore::new(db.pool().clone(), pdf_root, max_size_bytes),
            dir,
        )
    }

    #[tokio::test]
    async fn store_and_get_roundtrip() {
        let (cache, _dir) = store(10 * 1024 * 1024).await;
        let path = cache
            .store("10.1038/x", b"%PDF-1.4 fake", SourceType::OpenAlex)
            .await
            .unwrap();
        assert!(path.exists());
        let bytes = cache.get("10.1038/x").await.unwrap().unwrap();
        assert_eq!(bytes, b"%PDF-1.4 fake");

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn dedup_by_content_hash_shares_file() {
        let (cache, _dir) = store(10 * 1024 * 1024).await;
        let a = cache.store("A", b"same bytes", SourceType::Arxiv).await.unwrap();
        let b = cache.store("B", b"same bytes", SourceType::Arxiv).await.unwrap();
        assert_eq!(a, b);

        // deleting A leaves the shared file intact because B still references it
        assert!(cache.delete("A").await.unwrap());
        assert!(b.exists());

        // deleting B (the last reference) removes it
        assert!(cache.delete("B").await.unwrap());
        assert!(!b.exists());
    }

    #[tokio::test]
    async fn miss_on_unknown_identifier() {
        let (cache, _dir) = store(10 * 1024 * 1024).await;
        assert!(cache.get("nope").await.unwrap().is_none());
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn eviction_keeps_cache_under_budget() {
        // 3 entries of ~10 bytes each, max size tiny enough to force eviction
        let (cache, _dir) = store(15).await;
        cache.store("A", b"0123456789", SourceType::SemanticScholar).await.unwrap();
        cache.store("B", b"abcdefghij", SourceType::SemanticScholar).await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert!((stats.total_size as u64) <= 15 || stats.item_count <= 1);
    }

    #[tokio::test]
    async fn missing_file_on_disk_is_treated_as_miss_and_row_removed() {
        let (cache, _dir) = store(10 * 1024 * 1024).await;
        let path = cache.store("A", b"bytes", SourceType::Arxiv).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert!(cache.get("A").await.unwrap().is_none());
        assert!(!cache.has("A").await.unwrap());
    }
}
