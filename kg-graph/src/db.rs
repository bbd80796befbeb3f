//! `graph.db` connection pool and vector-index bootstrap. Same
//! `storage.rs::KnowledgeStore::open`/`init_sqlite_vec_once`
//! pattern, sized to a fixed embedding dimension `D` (§6) and
//! two vector tables rather than one (`ProblemMention` and
//! `ProblemConcept` both carry an embedding, per §6's vector-index list).

use std::path::Path;
use std::sync::OnceLock;

use libsqlite3_sys::{SQLITE_OK, sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::{GraphError, GraphResult};

const MIGRATION_SQL: &str = include_str!("../migrations/graph/0001_init.sql");

static SQLITE_VEC_INIT_RC: OnceLock<i32> = OnceLock::new();

/// Owns the `graph.db` connection pool backing the repository (C19), the
/// concept matcher's vector search (C16), and the search service (C20).
#[derive(Debug, Clone)]
pub struct GraphDbPool {
    pool: SqlitePool,
    embedding_dim: usize,
}

impl GraphDbPool {
    /// Open (creating if missing) the graph database at `db_path`, with
    /// vector indexes sized for `embedding_dim` (`D = 1536` per §6, but
    /// configurable via [`kg_core::config::EmbeddingSettings::dimension`]
    /// so tests can use a smaller dimension).
    pub async fn open(db_path: &Path, embedding_dim: usize) -> GraphResult<Self> {
        init_sqlite_vec_once()?;
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    GraphError::Db(sqlx::Error::Io(e))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        Self::from_options(options, embedding_dim).await
    }

    /// In-memory pool for tests.
    pub async fn open_in_memory(embedding_dim: usize) -> GraphResult<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:").foreign_keys(true);
        Self::from_options(options, embedding_dim).await
    }

    async fn from_options(options: SqliteConnectOptions, embedding_dim: usize) -> GraphResult<Self> {
        init_sqlite_vec_once()?;

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                    sqlx::query("PRAGMA synchronous = NORMAL").execute(&mut *conn).await?;
                    sqlx::query("PRAGMA cache_size = -64000").execute(&mut *conn).await?;
                    sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;
        ensure_vec_tables(&pool, embedding_dim).await?;

        Ok(Self { pool, embedding_dim })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn init_sqlite_vec_once() -> GraphResult<()> {
    let rc = *SQLITE_VEC_INIT_RC.get_or_init(|| unsafe {
        type SqliteVecInitFn =
            unsafe extern "C" fn(*mut sqlite3, *mut *const i8, *const sqlite3_api_routines) -> i32;

        sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteVecInitFn>(
            sqlite3_vec_init as *const (),
        )))
    });

    if rc == SQLITE_OK {
        Ok(())
    } else {
        Err(GraphError::SqliteVec(format!("sqlite-vec init failed with code {rc}")))
    }
}

async fn run_migrations(pool: &SqlitePool) -> GraphResult<()> {
    for statement in MIGRATION_SQL.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt).execute(pool).await?;
        }
    }
    Ok(())
}

/// `mention_vec`/`concept_vec` are `vec0` virtual tables keyed by the
/// owning row's implicit SQLite `rowid` (neither `problem_mentions.id` nor
/// `problem_concepts.id` is an `INTEGER PRIMARY KEY`, so the hidden rowid
/// column is free to reuse as the vector table's key — the same scheme the
/// teacher uses for `chunks`/`chunk_vec`).
async fn ensure_vec_tables(pool: &SqlitePool, dim: usize) -> GraphResult<()> {
    let mention_sql =
        format!("CREATE VIRTUAL TABLE IF NOT EXISTS mention_vec USING vec0(embedding float[{dim}])");
    let concept_sql =
        format!("CREATE VIRTUAL TABLE IF NOT EXISTS concept_vec USING vec0(embedding float[{dim}])");
    sqlx::query(&mention_sql).execute(pool).await?;
    sqlx::query(&concept_sql).execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_creates_vector_tables() {
        let db = GraphDbPool::open_in_memory(8).await.unwrap();
        let row: (String,) =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE name = 'mention_vec'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(row.0, "mention_vec");
    }
}
