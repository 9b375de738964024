//! # Redis 桩存储
//!
//! 每个上游一个哈希，键为上游标识，字段为路径，值为桩的 JSON。

use std::collections::HashMap;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tokio::sync::OnceCell;

use super::identity::UpstreamIdentity;
use super::storage::{StubMap, StubRecord, StubStorage};
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

/// Redis 桩存储
pub struct RedisStubStorage {
    client: Client,
    /// 首次使用时建立连接，之后复用
    connection: OnceCell<ConnectionManager>,
}

impl RedisStubStorage {
    /// 解析连接串；此时不会发起连接
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| ProxyError::config_with_source(format!("无效的 Redis 连接串: {url}"), e))?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                linfo!(
                    "system",
                    LogStage::Storage,
                    LogComponent::RedisStorage,
                    "connect_to_redis",
                    "正在连接 Redis 桩存储"
                );
                ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(|e| ProxyError::backend_with_source("建立 Redis 连接失败", e))
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl StubStorage for RedisStubStorage {
    async fn initialize(&self) -> Result<()> {
        // 连接延迟到第一次读写，Redis 暂时不可用时服务仍可启动
        ldebug!(
            "system",
            LogStage::Startup,
            LogComponent::RedisStorage,
            "redis_storage_ready",
            "Redis 桩存储已创建"
        );
        Ok(())
    }

    async fn get_stub_map(&self, identity: &UpstreamIdentity) -> Result<StubMap> {
        let mut conn = self.connection().await?;
        let raw: HashMap<String, String> = conn
            .hgetall(identity.as_str())
            .await
            .map_err(|e| ProxyError::backend_with_source(format!("读取桩失败: {identity}"), e))?;

        if raw.is_empty() {
            return Err(ProxyError::not_found("stubs", identity.as_str()));
        }

        raw.into_iter()
            .map(|(path, json)| {
                let record: StubRecord = serde_json::from_str(&json).map_err(|e| {
                    ProxyError::backend_with_source(
                        format!("桩数据无法解码: {identity} {path}"),
                        e,
                    )
                })?;
                Ok((path, record))
            })
            .collect()
    }

    async fn save_stub(
        &self,
        identity: &UpstreamIdentity,
        path: &str,
        record: StubRecord,
    ) -> Result<()> {
        let json = serde_json::to_string(&record)?;
        let mut conn = self.connection().await?;
        conn.hset::<_, _, _, ()>(identity.as_str(), path, json)
            .await
            .map_err(|e| ProxyError::backend_with_source(format!("保存桩失败: {identity} {path}"), e))?;

        ldebug!(
            "system",
            LogStage::Storage,
            LogComponent::RedisStorage,
            "stub_saved",
            &format!("桩已保存: identity={identity}, path={path}")
        );
        Ok(())
    }

    async fn remove_stub(&self, identity: &UpstreamIdentity, path: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn
            .hdel(identity.as_str(), path)
            .await
            .map_err(|e| ProxyError::backend_with_source(format!("删除桩失败: {identity} {path}"), e))?;

        if removed == 0 {
            return Err(ProxyError::not_found("stub", path));
        }
        ldebug!(
            "system",
            LogStage::Storage,
            LogComponent::RedisStorage,
            "stub_removed",
            &format!("桩已删除: identity={identity}, path={path}")
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
