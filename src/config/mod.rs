//! # 配置管理模块
//!
//! 处理应用配置加载、命令行覆盖和校验

mod app_config;
mod duration;
mod manager;

pub use app_config::{
    AppConfig, AuthConfig, ServerConfig, SessionConfig, StorageConfig, StorageType,
    StubCacheConfig, StubsConfig,
};
pub use duration::parse_duration;
pub use manager::{CliArgs, ConfigManager, DEFAULT_CONFIG_FILE};
