// Local persistence for the owner's advisory exchange rates

use alloy_primitives::U256;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::warn;

use crate::types::{format_amount, parse_amount, ExchangeRates};

pub mod file;
pub use file::FileRateStore;

pub mod factory;
pub use factory::{create_rate_store, RateStore};

pub const NATIVE_RATE_KEY: &str = "tjcd_bnb_rate";
pub const STABLE_RATE_KEY: &str = "tjcd_usdt_rate";

// Volatile store, used in tests and when no rates file is configured
pub struct MemoryRateStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read()
            .map_err(|e| anyhow!("Failed to acquire read lock on rates: {}", e))?;
        Ok(entries.get(key).cloned())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write()
            .map_err(|e| anyhow!("Failed to acquire write lock on rates: {}", e))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl Default for MemoryRateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads both rates; missing or unparseable entries count as unset.
pub async fn load_rates(store: &dyn RateStore) -> Result<ExchangeRates> {
    Ok(ExchangeRates {
        native: load_rate(store, NATIVE_RATE_KEY).await?,
        stable: load_rate(store, STABLE_RATE_KEY).await?,
    })
}

async fn load_rate(store: &dyn RateStore, key: &str) -> Result<U256> {
    let Some(raw) = store.get(key).await? else {
        return Ok(U256::ZERO);
    };
    match parse_amount(&raw) {
        Ok(rate) => Ok(rate),
        Err(_) => {
            warn!("Ignoring invalid stored rate {}={:?}", key, raw);
            Ok(U256::ZERO)
        }
    }
}

pub async fn save_rates(store: &dyn RateStore, rates: &ExchangeRates) -> Result<()> {
    store.set(NATIVE_RATE_KEY, &format_amount(rates.native)).await?;
    store.set(STABLE_RATE_KEY, &format_amount(rates.stable)).await?;
    Ok(())
}
