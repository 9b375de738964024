//! # 配置管理器
//!
//! 命令行参数解析、配置文件加载与命令行覆盖

use std::path::{Path, PathBuf};

use clap::Parser;

use super::{AppConfig, StorageType};
use crate::error::{ProxyError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};

/// 未显式指定时尝试加载的配置文件
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// 命令行参数
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "stub-router", version, about = "Mock-aware reverse proxy")]
pub struct CliArgs {
    /// 配置文件路径
    #[arg(short = 'c', long, env = "STUB_ROUTER_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// 监听地址
    #[arg(long)]
    pub host: Option<String>,

    /// 监听端口
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// 目标映射 `fork=url`（也接受 `fork:url`），可重复
    #[arg(short = 't', long = "target", value_parser = parse_target_pair)]
    pub targets: Vec<(String, String)>,

    /// 桩存储类型
    #[arg(long = "stub-type", value_enum)]
    pub stub_type: Option<StorageType>,

    /// 桩存储路径：文件目录或 Redis 连接串
    #[arg(long = "stub-path")]
    pub stub_path: Option<String>,

    /// 启用桩内存缓存
    #[arg(long = "stub-cache-enabled")]
    pub stub_cache_enabled: bool,

    /// 日志级别（RUST_LOG 优先）
    #[arg(long = "log-level", env = "STUB_ROUTER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// 打印日志配置说明后退出
    #[arg(long = "logging-help")]
    pub logging_help: bool,
}

/// 解析 `fork=url` / `fork:url`
fn parse_target_pair(raw: &str) -> std::result::Result<(String, String), String> {
    let (fork, url) = raw
        .split_once('=')
        .or_else(|| raw.split_once(':'))
        .ok_or_else(|| format!("目标映射格式应为 fork=url: {raw}"))?;
    let (fork, url) = (fork.trim(), url.trim());
    if fork.is_empty() || url.is_empty() {
        return Err(format!("目标映射格式应为 fork=url: {raw}"));
    }
    Ok((fork.to_string(), url.to_string()))
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 加载配置：文件（可选）+ 命令行覆盖 + 校验
    pub fn load(args: &CliArgs) -> Result<AppConfig> {
        let mut config = match &args.config {
            Some(path) => AppConfig::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                AppConfig::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => AppConfig::default(),
        };

        Self::apply_overrides(&mut config, args);
        config.validate()?;

        if config.targets.is_empty() {
            return Err(ProxyError::config("至少需要配置一个目标 (targets)"));
        }

        linfo!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "config_loaded",
            &format!(
                "配置加载完成: listen={}, storage={}, cache={}, targets={}",
                config.bind_address(),
                config.stubs.storage.storage_type.as_str(),
                config.stubs.storage.cache.enabled,
                config.targets.len()
            )
        );
        Ok(config)
    }

    /// 命令行参数覆盖配置文件
    pub fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
        if let Some(host) = &args.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = args.port {
            config.server.port = port;
        }
        for (fork, url) in &args.targets {
            config.targets.insert(fork.clone(), url.clone());
        }
        if let Some(storage_type) = args.stub_type {
            config.stubs.storage.storage_type = storage_type;
        }
        if let Some(path) = &args.stub_path {
            config.stubs.storage.path.clone_from(path);
        }
        if args.stub_cache_enabled {
            config.stubs.storage.cache.enabled = true;
        }
    }
}
