//! kg-db: durable SQLite-backed storage for the PDF cache (C6) and the
//! batch job queue (C14).
//!
//! Two independent databases live under the cache root (§6): `cache.db`
//! backs [`PdfCacheStore`], `batch.db` backs [`BatchQueueStore`]. Neither
//! crosses into the knowledge-graph store, which is `kg-graph`'s concern.

pub mod batch_db;
pub mod batch_store;
pub mod cache_db;
pub mod cache_store;
pub mod error;
mod pool;

pub use batch_db::BatchDbPool;
pub use batch_store::{BatchJob, BatchProgress, BatchQueueStore, JobStatus, SourceKind};
pub use cache_db::CacheDbPool;
pub use cache_store::{CacheStats, PdfCacheEntry, PdfCacheStore};
pub use error::{DbError, DbResult};

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
