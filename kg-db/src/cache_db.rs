//! `cache.db` connection pool (§6: "two SQLite databases under the cache
//! root — `cache.db` for PDF metadata").

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;
use crate::pool::{create_file_pool, create_in_memory_pool, run_migrations};

const MIGRATION_SQL: &str = include_str!("../migrations/cache/0001_init.sql");

/// Owns the `cache.db` connection pool backing the PDF cache metadata
/// store (C6).
#[derive(Debug, Clone)]
pub struct CacheDbPool {
    pool: SqlitePool,
}

impl CacheDbPool {
    /// Open (creating if missing) the cache database at `<cache_dir>/cache.db`.
    pub async fn open(cache_dir: &Path) -> DbResult<Self> {
        std::fs::create_dir_all(cache_dir)?;
        let db_path = cache_dir.join("cache.db");
        info!("opening PDF cache metadata store at {}", db_path.display());

        let pool = create_file_pool(&db_path, 5).await?;
        run_migrations(&pool, MIGRATION_SQL).await?;
        Ok(Self { pool })
    }

    /// In-memory pool for tests.
    pub async fn open_in_memory() -> DbResult<Self> {
        let pool = create_in_memory_pool(1).await?;
        run_migrations(&pool, MIGRATION_SQL).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn db_path(cache_dir: &Path) -> PathBuf {
        cache_dir.join("cache.db")
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
