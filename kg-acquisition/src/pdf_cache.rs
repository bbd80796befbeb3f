//! Thin wrapper tying the durable PDF cache (C6, `kg-db::PdfCacheStore`) into
//! the acquisition flow. All PDF downloads flow through here (§4.7) so that
//! content-addressing and LRU eviction apply uniformly regardless of which
//! source supplied the bytes.

use std::sync::Arc;

use kg_core::SourceType;
use kg_db::PdfCacheStore;
use sha2::Digest;

use crate::error::AcquisitionResult;

#[derive(Clone)]
pub struct PdfCache {
    store: Arc<PdfCacheStore>,
}

impl PdfCache {
    pub fn new(store: Arc<PdfCacheStore>) -> Self {
        Self { store }
    }

    pub async fn store(&self, identifier: &str, content: &[u8], source: SourceType) -> AcquisitionResult<(std::path::PathBuf, u64, String)> {
        let path = self.store.store(identifier, content, source).await?;
        let size = content.len() as u64;
        let content_hash = format!("{:x}", sha2::Sha256::digest(content));
        Ok((path, size, content_hash))
    }

    pub async fn get(&self, identifier: &str) -> AcquisitionResult<Option<Vec<u8>>> {
        Ok(self.store.get(identifier).await?)
    }

    pub async fn has(&self, identifier: &str) -> AcquisitionResult<bool> {
        Ok(self.store.has(identifier).await?)
    }
}
