//! Shared SQLite pool bootstrap for the two durable stores named in §6:
//! `cache.db` (C6) and `batch.db` (C14). Same pragma set as
//! `sqlite_runtime.rs`, minus the `sqlite-vec` extension load
//! (no vector index lives in either of these databases; that's `kg-graph`'s
//! concern against its own store).

use std::path::Path;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::DbResult;

pub(crate) async fn create_file_pool(db_path: &Path, max_connections: u32) -> DbResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);
    create_pool(options, max_connections).await
}

pub(crate) async fn create_in_memory_pool(max_connections: u32) -> DbResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(":memory:")
        .foreign_keys(true);
    create_pool(options, max_connections).await
}

async fn create_pool(options: SqliteConnectOptions, max_connections: u32) -> DbResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    apply_common_pragmas(&pool).await?;
    Ok(pool)
}

async fn apply_common_pragmas(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA synchronous = NORMAL").execute(pool).await?;
    sqlx::query("PRAGMA cache_size = -64000").execute(pool).await?;
    Ok(())
}

pub(crate) async fn run_migrations(pool: &SqlitePool, sql: &str) -> DbResult<()> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| crate::error::DbError::Migration(e.to_string()))?;
        }
    }
    Ok(())
}
