//! 进程内桩存储，重启即丢失，主要用于本地调试与测试

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::identity::UpstreamIdentity;
use super::storage::{StubMap, StubRecord, StubStorage};
use crate::error::{ProxyError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};

#[derive(Default)]
pub struct MemoryStubStorage {
    services: RwLock<HashMap<UpstreamIdentity, StubMap>>,
}

impl MemoryStubStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StubStorage for MemoryStubStorage {
    async fn initialize(&self) -> Result<()> {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::MemoryStorage,
            "memory_storage_ready",
            "内存桩存储就绪，数据不会持久化"
        );
        Ok(())
    }

    async fn get_stub_map(&self, identity: &UpstreamIdentity) -> Result<StubMap> {
        self.services
            .read()
            .await
            .get(identity)
            .cloned()
            .ok_or_else(|| ProxyError::not_found("stubs", identity.as_str()))
    }

    async fn save_stub(
        &self,
        identity: &UpstreamIdentity,
        path: &str,
        record: StubRecord,
    ) -> Result<()> {
        self.services
            .write()
            .await
            .entry(identity.clone())
            .or_default()
            .insert(path.to_string(), record);
        Ok(())
    }

    async fn remove_stub(&self, identity: &UpstreamIdentity, path: &str) -> Result<()> {
        let mut services = self.services.write().await;
        let stubs = services
            .get_mut(identity)
            .ok_or_else(|| ProxyError::not_found("stubs", identity.as_str()))?;
        stubs
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| ProxyError::not_found("stub", path))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_get_remove() {
        let storage = MemoryStubStorage::new();
        let id = UpstreamIdentity::parse("http://upstream-a").unwrap();

        assert!(storage.get_stub_map(&id).await.unwrap_err().is_not_found());

        storage.save_stub(&id, "/ping", StubRecord::new(200, "pong")).await.unwrap();
        storage.save_stub(&id, "/ping", StubRecord::new(503, "down")).await.unwrap();

        let map = storage.get_stub_map(&id).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["/ping"].status_code, 503);

        storage.remove_stub(&id, "/ping").await.unwrap();
        assert!(storage.remove_stub(&id, "/ping").await.unwrap_err().is_not_found());
        // 上游条目仍在，只是为空
        assert!(storage.get_stub_map(&id).await.unwrap().is_empty());
    }
}
