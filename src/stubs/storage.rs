//! 桩数据模型与存储抽象

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::identity::UpstreamIdentity;
use crate::error::Result;

/// 一条桩：某个 (上游, 路径) 的预置响应
///
/// 序列化字段名沿用管理页面使用的 `code` / `data` / `headers` / `timeout`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubRecord {
    /// 响应状态码
    #[serde(rename = "code", alias = "statusCode")]
    pub status_code: u16,
    /// 响应体
    #[serde(rename = "data", alias = "body", default)]
    pub body: String,
    /// 响应头
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// 模拟延迟（毫秒）
    #[serde(rename = "timeout", alias = "delayMillis", default)]
    pub delay_millis: u64,
}

impl StubRecord {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
            headers: BTreeMap::new(),
            delay_millis: 0,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay_millis: u64) -> Self {
        self.delay_millis = delay_millis;
        self
    }
}

/// 某个上游的全部桩，路径唯一
pub type StubMap = BTreeMap<String, StubRecord>;

/// 桩存储能力集
///
/// 三种实现：文件、Redis、内存；`CachedStubStorage` 可以包装任意一种。
#[async_trait]
pub trait StubStorage: Send + Sync {
    /// 构造之后的初始化（建目录、启动清理任务等）
    async fn initialize(&self) -> Result<()>;

    /// 读取上游的全部桩
    ///
    /// 不存在时返回 `NotFound`，IO/连接/解码失败返回 `Backend`。
    async fn get_stub_map(&self, identity: &UpstreamIdentity) -> Result<StubMap>;

    /// 新建或整体替换某路径的桩
    async fn save_stub(
        &self,
        identity: &UpstreamIdentity,
        path: &str,
        record: StubRecord,
    ) -> Result<()>;

    /// 删除某路径的桩，上游或路径不存在时返回 `NotFound`
    async fn remove_stub(&self, identity: &UpstreamIdentity, path: &str) -> Result<()>;

    /// 后端名称，用于日志
    fn backend_name(&self) -> &'static str;
}
