//! 上游标识
//!
//! 由上游 URL 的 scheme / host / port 规范化得到，是桩存储唯一的寻址键。

use std::fmt;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::error::{ProxyError, Result};

/// 上游标识，形如 `http_billing.internal_8080`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpstreamIdentity(String);

impl UpstreamIdentity {
    /// 从 URL 计算标识，路径与查询串不参与
    ///
    /// 未显式写端口时使用 scheme 的默认端口，因此 `http://x` 与 `http://x:80` 相同。
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_ascii_lowercase(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => format!("[{ip}]"),
            None => {
                return Err(ProxyError::validation(
                    format!("上游地址缺少 host: {url}"),
                    Some("target"),
                ));
            }
        };
        let port = url
            .port_or_known_default()
            .map(|p| p.to_string())
            .unwrap_or_default();

        Ok(Self(format!("{}_{}_{}", url.scheme(), host, port)))
    }

    /// 从原始字符串解析后计算标识
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim()).map_err(|e| {
            ProxyError::validation(format!("无效的上游地址 '{raw}': {e}"), Some("target"))
        })?;
        Self::from_url(&url)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 适合作为文件名的形式，非 `[A-Za-z0-9._-]` 字符替换为 `_`
    #[must_use]
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for UpstreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ignores_path_and_query() {
        let a = UpstreamIdentity::parse("http://billing.internal:8080/api/v1?x=1").unwrap();
        let b = UpstreamIdentity::parse("http://billing.internal:8080").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "http_billing.internal_8080");
    }

    #[test]
    fn test_identity_uses_default_port() {
        let implicit = UpstreamIdentity::parse("http://upstream-a").unwrap();
        let explicit = UpstreamIdentity::parse("http://UPSTREAM-A:80/ping").unwrap();
        assert_eq!(implicit, explicit);
        assert_eq!(implicit.as_str(), "http_upstream-a_80");

        let tls = UpstreamIdentity::parse("https://upstream-a").unwrap();
        assert_eq!(tls.as_str(), "https_upstream-a_443");
    }

    #[test]
    fn test_file_stem_is_filesystem_safe() {
        let id = UpstreamIdentity::parse("http://[::1]:9000").unwrap();
        assert_eq!(id.as_str(), "http_[::1]_9000");
        assert_eq!(id.file_stem(), "http____1__9000");
    }

    #[test]
    fn test_invalid_target_is_validation_error() {
        let err = UpstreamIdentity::parse("not a url").unwrap_err();
        assert!(matches!(err, ProxyError::Validation { .. }));
    }
}
