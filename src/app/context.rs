//! 应用上下文（DI 容器）
//!
//! 统一持有跨模块共享的服务实例，便于在测试中注入替身实现。

use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::config::AppConfig;
use crate::error::Result;
use crate::proxy::{Dispatcher, TargetRegistry, UpstreamForwarder};
use crate::session::SessionManager;
use crate::stubs::{StubStorage, StubStorageFactory};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StubStorage>,
    pub targets: Arc<TargetRegistry>,
    pub sessions: Arc<SessionManager>,
    pub tokens: Arc<TokenIssuer>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppContext {
    /// 用给定的存储与会话管理器组装上下文，测试中用来注入内存实现
    pub fn new(
        config: Arc<AppConfig>,
        storage: Arc<dyn StubStorage>,
        sessions: Arc<SessionManager>,
    ) -> Result<Self> {
        let targets = Arc::new(TargetRegistry::from_config(&config.targets)?);
        let tokens = Arc::new(TokenIssuer::from_config(&config.session));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&targets),
            Arc::clone(&storage),
            UpstreamForwarder::new()?,
        ));

        Ok(Self {
            config,
            storage,
            targets,
            sessions,
            tokens,
            dispatcher,
        })
    }

    /// 按配置创建全部组件
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let config = Arc::new(config);
        let storage = StubStorageFactory::create(&config.stubs.storage).await?;
        let sessions = Arc::new(SessionManager::from_config(&config.session)?);
        Self::new(config, storage, sessions)
    }
}
