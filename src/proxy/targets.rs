//! # 目标注册表
//!
//! 分叉路径（请求路径的第一段）到上游地址的只读映射，启动时构建一次。

use std::collections::BTreeMap;

use url::Url;

use crate::error::{ProxyError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use crate::stubs::UpstreamIdentity;

/// 被内置路由占用、不能作为分叉的路径
pub const RESERVED_FORKS: &[&str] = &["/login", "/logout", "/stubapi", "/static"];

/// 一个上游目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// 规范化后的分叉路径，如 `/billing`
    pub fork: String,
    /// 上游基础地址
    pub base_url: Url,
    /// 由基础地址计算出的上游标识
    pub identity: UpstreamIdentity,
}

/// 分叉路径 -> 上游目标
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Target>,
}

/// 按 Go `path.Clean("/" + raw)` 的规则规范化路径
///
/// 合并重复的 `/`，处理 `.` 与 `..`，去掉末尾的 `/`；结果总以 `/` 开头。
#[must_use]
pub fn clean_path(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

fn parse_base_url(fork: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        ProxyError::config_with_source(format!("目标 '{fork}' 的上游地址无效: {raw}"), e)
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::config(format!(
            "目标 '{fork}' 的上游地址必须是 http/https: {raw}"
        )));
    }
    if url.host().is_none() {
        return Err(ProxyError::config(format!(
            "目标 '{fork}' 的上游地址缺少 host: {raw}"
        )));
    }
    Ok(url)
}

impl TargetRegistry {
    /// 从 `(原始路径, 上游地址)` 列表构建
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut targets = BTreeMap::new();

        for (raw_path, raw_url) in pairs {
            let (raw_path, raw_url) = (raw_path.as_ref(), raw_url.as_ref());
            let fork = clean_path(raw_path);

            if fork == "/" {
                return Err(ProxyError::config(format!(
                    "目标路径 '{raw_path}' 规范化后为根路径，不能作为分叉"
                )));
            }
            if fork[1..].contains('/') {
                return Err(ProxyError::config(format!(
                    "目标路径 '{raw_path}' 只能包含一段，规范化结果为 '{fork}'"
                )));
            }
            if RESERVED_FORKS.contains(&fork.as_str()) {
                return Err(ProxyError::config(format!(
                    "目标路径 '{raw_path}' 与内置路由 '{fork}' 冲突"
                )));
            }
            if targets.contains_key(&fork) {
                return Err(ProxyError::config(format!(
                    "目标路径 '{raw_path}' 规范化后与已有分叉 '{fork}' 重复"
                )));
            }

            let base_url = parse_base_url(&fork, raw_url)?;
            let identity = UpstreamIdentity::from_url(&base_url)
                .map_err(|e| ProxyError::config(format!("目标 '{fork}': {e}")))?;

            targets.insert(
                fork.clone(),
                Target {
                    fork,
                    base_url,
                    identity,
                },
            );
        }

        Ok(Self { targets })
    }

    /// 从配置中的 `targets` 表构建
    pub fn from_config(targets: &BTreeMap<String, String>) -> Result<Self> {
        let registry = Self::from_pairs(targets)?;
        for target in registry.targets.values() {
            linfo!(
                "system",
                LogStage::Configuration,
                LogComponent::TargetRegistry,
                "target_registered",
                &format!("注册目标: {} -> {} ({})", target.fork, target.base_url, target.identity)
            );
        }
        Ok(registry)
    }

    /// 请求路径的第一段，`/billing/invoices/42` -> `/billing`
    #[must_use]
    pub fn fork_of(path: &str) -> &str {
        match path.get(1..).and_then(|rest| rest.find('/')) {
            Some(index) => &path[..=index],
            None => path,
        }
    }

    /// 按请求路径的分叉查找目标
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Target> {
        self.targets.get(Self::fork_of(path))
    }

    /// 去掉分叉得到上游路径，`/billing/` -> `/`
    #[must_use]
    pub fn strip_fork<'a>(path: &'a str, fork: &str) -> &'a str {
        match path.strip_prefix(fork) {
            Some("") | None => "/",
            Some(rest) => rest,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
