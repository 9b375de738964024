//! 按配置创建桩存储

use std::sync::Arc;

use super::cached::CachedStubStorage;
use super::file::FileStubStorage;
use super::memory::MemoryStubStorage;
use super::redis_store::RedisStubStorage;
use super::storage::StubStorage;
use crate::config::{StorageConfig, StorageType};
use crate::error::Result;
use crate::linfo;
use crate::logging::{LogComponent, LogStage};

pub struct StubStorageFactory;

impl StubStorageFactory {
    /// 创建并初始化桩存储，启用缓存时包装一层 `CachedStubStorage`
    pub async fn create(config: &StorageConfig) -> Result<Arc<dyn StubStorage>> {
        let backend: Arc<dyn StubStorage> = match config.storage_type {
            StorageType::File => Arc::new(FileStubStorage::new(&config.path)),
            StorageType::Redis => Arc::new(RedisStubStorage::new(&config.path)?),
            StorageType::Memory => Arc::new(MemoryStubStorage::new()),
        };

        let storage: Arc<dyn StubStorage> = if config.cache.enabled {
            Arc::new(CachedStubStorage::new(
                backend,
                config.cache.expiration()?,
                config.cache.cleanup()?,
                config.cache.invalidate_on_write,
            ))
        } else {
            backend
        };

        storage.initialize().await?;
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "stub_storage_created",
            &format!(
                "桩存储已创建: type={}, cache={}",
                config.storage_type.as_str(),
                config.cache.enabled
            )
        );
        Ok(storage)
    }
}
