// Rate store factory for switching between file-backed and in-memory storage

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::{FileRateStore, MemoryRateStore};

// Key/value surface both implementations satisfy
#[async_trait::async_trait]
pub trait RateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[async_trait::async_trait]
impl RateStore for MemoryRateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        MemoryRateStore::get(self, key)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        MemoryRateStore::set(self, key, value)
    }
}

#[async_trait::async_trait]
impl RateStore for FileRateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set(key, value).await
    }
}

/// File-backed store at `path`; an empty path keeps rates in memory only.
pub async fn create_rate_store(path: &Path) -> Arc<dyn RateStore> {
    if path.as_os_str().is_empty() {
        info!("Exchange rates kept in memory only");
        return Arc::new(MemoryRateStore::new());
    }

    match FileRateStore::open(path).await {
        Ok(store) => {
            info!("Exchange rates stored in {}", path.display());
            Arc::new(store)
        }
        Err(e) => {
            warn!("Cannot use rates file {}: {}; falling back to memory", path.display(), e);
            Arc::new(MemoryRateStore::new())
        }
    }
}
