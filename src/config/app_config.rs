//! # 应用配置结构定义

use super::duration::parse_duration;
use crate::error::{ProxyError, Result};
use crate::ensure_config;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 监听配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 会话配置
    #[serde(default)]
    pub session: SessionConfig,
    /// 登录校验配置
    #[serde(default)]
    pub auth: AuthConfig,
    /// 分叉路径 -> 上游地址
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
    /// 桩存储配置
    #[serde(default)]
    pub stubs: StubsConfig,
}

/// 监听配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3333,
        }
    }
}

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 会话生命周期（如 `24h`）
    pub duration: String,
    /// 空闲超时，`0h` 表示不限制
    pub idle_timeout: String,
    /// 会话 cookie 名称
    pub cookie_name: String,
    /// 令牌签名密钥
    pub token_secret: String,
    /// 令牌中存放用户名的字段
    pub userid_field: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration: "24h".to_string(),
            idle_timeout: "0h".to_string(),
            cookie_name: "sessid".to_string(),
            token_secret: String::new(),
            userid_field: "sub".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn lifetime(&self) -> Result<Duration> {
        parse_duration(&self.duration)
            .map_err(|e| ProxyError::config(format!("session.duration 无效: {e}")))
    }

    /// 空闲超时；为零时返回 `None`
    pub fn idle(&self) -> Result<Option<Duration>> {
        let idle = parse_duration(&self.idle_timeout)
            .map_err(|e| ProxyError::config(format!("session.idle_timeout 无效: {e}")))?;
        Ok((!idle.is_zero()).then_some(idle))
    }
}

/// 登录校验配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// 是否要求先登录再访问代理与首页
    #[serde(default)]
    pub enabled: bool,
}

/// 桩配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StubsConfig {
    #[serde(default)]
    pub storage: StorageConfig,
}

/// 存储类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// 本地 YAML 文件
    #[default]
    File,
    /// Redis 哈希
    Redis,
    /// 进程内存（重启即丢失）
    Memory,
}

impl StorageType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

/// 桩存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 存储类型
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// 文件根目录或 Redis 连接串
    pub path: String,
    /// 内存缓存
    pub cache: StubCacheConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::File,
            path: ".".to_string(),
            cache: StubCacheConfig::default(),
        }
    }
}

/// 桩缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StubCacheConfig {
    /// 是否启用缓存
    pub enabled: bool,
    /// 缓存条目存活时间
    pub expiration_interval: String,
    /// 后台清理周期
    pub cleanup_interval: String,
    /// 写入/删除桩后是否立即使缓存失效
    ///
    /// 默认关闭：保持历史行为，缓存条目过期前读到的可能是旧数据。
    pub invalidate_on_write: bool,
}

impl Default for StubCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            expiration_interval: "30m".to_string(),
            cleanup_interval: "60m".to_string(),
            invalidate_on_write: false,
        }
    }
}

impl StubCacheConfig {
    pub fn expiration(&self) -> Result<Duration> {
        parse_duration(&self.expiration_interval).map_err(|e| {
            ProxyError::config(format!("stubs.storage.cache.expiration_interval 无效: {e}"))
        })
    }

    pub fn cleanup(&self) -> Result<Duration> {
        parse_duration(&self.cleanup_interval).map_err(|e| {
            ProxyError::config(format!("stubs.storage.cache.cleanup_interval 无效: {e}"))
        })
    }
}

impl AppConfig {
    /// 从 TOML 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_config!(path.exists(), "配置文件不存在: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
        })?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 文本解析
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 监听地址 `host:port`
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 验证配置的有效性
    ///
    /// 分叉路径的规范化与冲突检查在构建 `TargetRegistry` 时完成。
    pub fn validate(&self) -> Result<()> {
        ensure_config!(self.server.port != 0, "无效的服务器端口: {}", self.server.port);
        ensure_config!(!self.server.host.trim().is_empty(), "监听地址不能为空");
        ensure_config!(
            !self.session.cookie_name.trim().is_empty(),
            "session.cookie_name 不能为空"
        );

        self.session.lifetime()?;
        self.session.idle()?;

        let storage = &self.stubs.storage;
        ensure_config!(
            !storage.path.trim().is_empty(),
            "stubs.storage.path 不能为空 (type = {})",
            storage.storage_type.as_str()
        );
        if storage.cache.enabled {
            let expiration = storage.cache.expiration()?;
            ensure_config!(!expiration.is_zero(), "缓存过期时间必须大于0");
            let cleanup = storage.cache.cleanup()?;
            ensure_config!(!cleanup.is_zero(), "缓存清理周期必须大于0");
        }

        Ok(())
    }
}
