//! Cache layer
//!
//! Services keep hot read paths (module trees, nav trees, site settings,
//! rendered article views) here. Values are stored as JSON so any
//! serializable type can be cached. Writes invalidate by key or glob
//! pattern.
//!
//! The driver is picked from configuration: `memory` uses moka, `none`
//! turns every operation into a no-op so reads always hit the database.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, CacheDriver};

pub use memory::MemoryCache;

/// Cache layer trait
///
/// The methods are generic, so this trait is not object safe. Use the
/// [`Cache`] enum for runtime polymorphism.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Store a value that expires after `ttl`
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching a glob pattern (`*` and `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Configured cache backend
#[derive(Debug)]
pub enum Cache {
    Memory(MemoryCache),
    Disabled,
}

impl Cache {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Cache::Disabled)
    }
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
            Cache::Disabled => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
            Cache::Disabled => Ok(()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete(key).await,
            Cache::Disabled => Ok(()),
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete_pattern(pattern).await,
            Cache::Disabled => Ok(()),
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.clear().await,
            Cache::Disabled => Ok(()),
        }
    }
}

/// Build the cache selected by configuration
pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    let cache = match config.driver {
        CacheDriver::Memory => {
            tracing::info!(
                max_capacity = config.max_capacity,
                ttl_seconds = config.ttl_seconds,
                "Using in-memory cache"
            );
            Cache::Memory(MemoryCache::with_capacity_and_ttl(
                config.max_capacity,
                Duration::from_secs(config.ttl_seconds),
            ))
        }
        CacheDriver::None => {
            tracing::info!("Caching disabled");
            Cache::Disabled
        }
    };
    Arc::new(cache)
}

/// Shared cache for tests and tools that don't load configuration
pub fn default_cache() -> Arc<Cache> {
    create_cache(&CacheConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_driver_round_trip() {
        let cache = default_cache();
        assert!(cache.is_enabled());
        cache.set("k", &42i32, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get::<i32>("k").await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_disabled_driver_never_stores() {
        let config = CacheConfig {
            driver: CacheDriver::None,
            ..CacheConfig::default()
        };
        let cache = create_cache(&config);
        assert!(!cache.is_enabled());
        cache.set("k", &"v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get::<String>("k").await.unwrap(), None);
        cache.delete_pattern("*").await.unwrap();
        cache.clear().await.unwrap();
    }
}
