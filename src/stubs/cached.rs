//! # 桩缓存装饰器
//!
//! 包装任意 `StubStorage`，把成功读取到的整张桩表按上游缓存一段时间。
//! 写入和删除直接透传；是否顺带失效缓存由 `invalidate_on_write` 决定，
//! 关闭时过期前读到的可能是旧数据。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tokio::task::JoinHandle;

use super::identity::UpstreamIdentity;
use super::storage::{StubMap, StubRecord, StubStorage};
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

/// 带过期时间的桩表缓存
pub struct CachedStubStorage {
    inner: Arc<dyn StubStorage>,
    cache: Cache<UpstreamIdentity, Arc<StubMap>>,
    invalidate_on_write: bool,
    cleanup_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CachedStubStorage {
    pub fn new(
        inner: Arc<dyn StubStorage>,
        expiration: Duration,
        cleanup_interval: Duration,
        invalidate_on_write: bool,
    ) -> Self {
        let cache = Cache::builder().time_to_live(expiration).build();
        Self {
            inner,
            cache,
            invalidate_on_write,
            cleanup_interval,
            sweeper: Mutex::new(None),
        }
    }

    async fn after_write(&self, identity: &UpstreamIdentity) {
        if self.invalidate_on_write {
            self.cache.invalidate(identity).await;
            ldebug!(
                "system",
                LogStage::Cache,
                LogComponent::Cache,
                "cache_invalidated",
                &format!("写入后失效缓存: {identity}")
            );
        }
    }
}

#[async_trait]
impl StubStorage for CachedStubStorage {
    async fn initialize(&self) -> Result<()> {
        self.inner.initialize().await?;

        let cache = self.cache.clone();
        let interval = self.cleanup_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.run_pending_tasks().await;
            }
        });

        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(previous) = sweeper.replace(handle) {
                previous.abort();
            }
        }

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Cache,
            "stub_cache_ready",
            &format!(
                "桩缓存已启用: backend={}, cleanup_interval={:?}, invalidate_on_write={}",
                self.inner.backend_name(),
                self.cleanup_interval,
                self.invalidate_on_write
            )
        );
        Ok(())
    }

    async fn get_stub_map(&self, identity: &UpstreamIdentity) -> Result<StubMap> {
        if let Some(hit) = self.cache.get(identity).await {
            ldebug!(
                "system",
                LogStage::Cache,
                LogComponent::Cache,
                "cache_hit",
                &format!("缓存命中: {identity}")
            );
            return Ok(hit.as_ref().clone());
        }

        // 失败结果不缓存
        let stubs = self.inner.get_stub_map(identity).await?;
        self.cache
            .insert(identity.clone(), Arc::new(stubs.clone()))
            .await;
        ldebug!(
            "system",
            LogStage::Cache,
            LogComponent::Cache,
            "cache_fill",
            &format!("缓存未命中，已回填: {identity}")
        );
        Ok(stubs)
    }

    async fn save_stub(
        &self,
        identity: &UpstreamIdentity,
        path: &str,
        record: StubRecord,
    ) -> Result<()> {
        self.inner.save_stub(identity, path, record).await?;
        self.after_write(identity).await;
        Ok(())
    }

    async fn remove_stub(&self, identity: &UpstreamIdentity, path: &str) -> Result<()> {
        self.inner.remove_stub(identity, path).await?;
        self.after_write(identity).await;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

impl Drop for CachedStubStorage {
    fn drop(&mut self) {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(handle) = sweeper.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxyError;
    use crate::stubs::memory::MemoryStubStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 统计读取次数的内存存储
    #[derive(Default)]
    struct CountingStorage {
        inner: MemoryStubStorage,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl StubStorage for CountingStorage {
        async fn initialize(&self) -> Result<()> {
            Ok(())
        }
        async fn get_stub_map(&self, identity: &UpstreamIdentity) -> Result<StubMap> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_stub_map(identity).await
        }
        async fn save_stub(
            &self,
            identity: &UpstreamIdentity,
            path: &str,
            record: StubRecord,
        ) -> Result<()> {
            self.inner.save_stub(identity, path, record).await
        }
        async fn remove_stub(&self, identity: &UpstreamIdentity, path: &str) -> Result<()> {
            self.inner.remove_stub(identity, path).await
        }
        fn backend_name(&self) -> &'static str {
            "counting"
        }
    }

    fn identity() -> UpstreamIdentity {
        UpstreamIdentity::parse("http://upstream-a").unwrap()
    }

    fn cached(inner: &Arc<CountingStorage>, ttl: Duration, invalidate: bool) -> CachedStubStorage {
        let inner: Arc<dyn StubStorage> = inner.clone();
        CachedStubStorage::new(inner, ttl, Duration::from_secs(60), invalidate)
    }

    #[tokio::test]
    async fn test_hit_skips_inner_store() {
        let inner = Arc::new(CountingStorage::default());
        inner.save_stub(&identity(), "/ping", StubRecord::new(200, "pong")).await.unwrap();
        let storage = cached(&inner, Duration::from_secs(60), false);
        storage.initialize().await.unwrap();

        storage.get_stub_map(&identity()).await.unwrap();
        storage.get_stub_map(&identity()).await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let inner = Arc::new(CountingStorage::default());
        let storage = cached(&inner, Duration::from_secs(60), false);

        let err = storage.get_stub_map(&identity()).await.unwrap_err();
        assert!(matches!(err, ProxyError::NotFound { .. }));
        assert!(storage.get_stub_map(&identity()).await.is_err());
        assert_eq!(inner.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_write_without_invalidation_serves_stale_until_expiry() {
        let inner = Arc::new(CountingStorage::default());
        inner.save_stub(&identity(), "/ping", StubRecord::new(200, "old")).await.unwrap();
        let storage = cached(&inner, Duration::from_millis(200), false);

        assert_eq!(storage.get_stub_map(&identity()).await.unwrap()["/ping"].body, "old");
        storage.save_stub(&identity(), "/ping", StubRecord::new(200, "new")).await.unwrap();
        assert_eq!(storage.get_stub_map(&identity()).await.unwrap()["/ping"].body, "old");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(storage.get_stub_map(&identity()).await.unwrap()["/ping"].body, "new");
    }

    #[tokio::test]
    async fn test_write_with_invalidation_is_visible_immediately() {
        let inner = Arc::new(CountingStorage::default());
        inner.save_stub(&identity(), "/ping", StubRecord::new(200, "old")).await.unwrap();
        let storage = cached(&inner, Duration::from_secs(60), true);

        storage.get_stub_map(&identity()).await.unwrap();
        storage.save_stub(&identity(), "/ping", StubRecord::new(200, "new")).await.unwrap();
        assert_eq!(storage.get_stub_map(&identity()).await.unwrap()["/ping"].body, "new");

        storage.remove_stub(&identity(), "/ping").await.unwrap();
        assert!(storage.get_stub_map(&identity()).await.unwrap().is_empty());
    }
}
