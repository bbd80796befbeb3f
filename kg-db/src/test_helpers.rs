//! Test helpers for kg-db consumers (other crates' integration tests).

use crate::batch_db::BatchDbPool;
use crate::batch_store::BatchQueueStore;
use crate::cache_db::CacheDbPool;
use crate::cache_store::PdfCacheStore;
use crate::error::DbResult;

/// Create an in-memory PDF cache store for testing.
pub async fn create_test_cache_store(pdf_root: std::path::PathBuf) -> DbResult<PdfCacheStore> {
    let db = CacheDbPool::open_in_memory().await?;
    Ok(PdfCacheStore::new(db.pool().clone(), pdf_root, u64::MAX))
}

/// Create an in-memory batch queue store for testing.
pub async fn create_test_batch_store() -> DbResult<BatchQueueStore> {
    let db = BatchDbPool::open_in_memory().await?;
    Ok(BatchQueueStore::new(db.pool().clone()))
}
