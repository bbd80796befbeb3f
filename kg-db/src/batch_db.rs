//! `batch.db` connection pool (§6: "`batch.db` (or in-memory) for job
//! queue").

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;
use crate::pool::{create_file_pool, create_in_memory_pool, run_migrations};

const MIGRATION_SQL: &str = include_str!("../migrations/batch/0001_init.sql");

/// Owns the `batch.db` connection pool backing the batch job queue (C14).
#[derive(Debug, Clone)]
pub struct BatchDbPool {
    pool: SqlitePool,
}

impl BatchDbPool {
    /// Open (creating if missing) the batch database at `db_path`. Pass
    /// `:memory:` for an in-process, non-persistent queue.
    pub async fn open(db_path: &str) -> DbResult<Self> {
        let pool = if db_path == ":memory:" {
            create_in_memory_pool(1).await?
        } else {
            let path = Path::new(db_path);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            info!("opening batch job queue store at {}", path.display());
            create_file_pool(path, 5).await?
        };
        run_migrations(&pool, MIGRATION_SQL).await?;
        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> DbResult<Self> {
        Self::open(":memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn db_path(cache_dir: &Path) -> PathBuf {
        cache_dir.join("batch.db")
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
