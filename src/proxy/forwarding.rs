//! # 上游转发
//!
//! 把入站请求改写到目标上游后原样转发，请求体与响应体都以流的方式透传。
//! 不跟随重定向，不重试，失败即返回 `ProxyError::Upstream`。

use std::collections::HashSet;

use axum::body::{Body, HttpBody};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, header};
use axum::response::Response;
use url::Url;

use super::targets::Target;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror};

/// 代理不能转发的逐跳头
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// 上游转发器
#[derive(Clone)]
pub struct UpstreamForwarder {
    client: reqwest::Client,
}

impl UpstreamForwarder {
    /// 创建转发器
    ///
    /// 上游多为内网测试环境的自签名证书，这里有意关闭证书校验。
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProxyError::config_with_source("创建上游 HTTP 客户端失败", e))?;
        Ok(Self { client })
    }

    /// 上游地址 = 基础地址 + 上游路径，查询串保留
    #[must_use]
    pub fn build_upstream_url(base: &Url, upstream_path: &str, query: Option<&str>) -> Url {
        let mut url = base.clone();

        let base_path = base.path().trim_end_matches('/');
        url.set_path(&format!("{base_path}{upstream_path}"));

        let base_query = base.query().filter(|q| !q.is_empty());
        let merged_query = match (base_query, query.filter(|q| !q.is_empty())) {
            (Some(base_query), Some(query)) => Some(format!("{base_query}&{query}")),
            (Some(base_query), None) => Some(base_query.to_string()),
            (None, Some(query)) => Some(query.to_string()),
            (None, None) => None,
        };
        url.set_query(merged_query.as_deref());
        url.set_fragment(None);
        url
    }

    /// 转发请求
    ///
    /// `bearer` 存在时覆盖 `Authorization`，否则入站的 `Authorization` 原样透传。
    pub async fn forward(
        &self,
        request_id: &str,
        target: &Target,
        upstream_path: &str,
        request: Request<Body>,
        bearer: Option<&str>,
    ) -> Result<Response> {
        let (parts, body) = request.into_parts();
        let url = Self::build_upstream_url(&target.base_url, upstream_path, parts.uri.query());

        let inbound_host = parts
            .headers
            .get(header::HOST)
            .cloned()
            .or_else(|| {
                parts
                    .uri
                    .authority()
                    .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
            });

        let mut headers = strip_hop_by_hop(&parts.headers);
        headers.remove(header::HOST);
        if let Some(host) = inbound_host {
            headers.insert(HeaderName::from_static(X_FORWARDED_HOST), host);
        }
        if let Some(token) = bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ProxyError::internal_with_source("令牌无法作为请求头发送", e))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        ldebug!(
            request_id,
            LogStage::Forwarding,
            LogComponent::Forwarder,
            "forward_request",
            &format!("转发请求: {} {} -> {}", parts.method, parts.uri.path(), url)
        );

        let mut outbound = self.client.request(parts.method, url.clone()).headers(headers);
        if !body.is_end_stream() {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = outbound.send().await.map_err(|e| {
            lerror!(
                request_id,
                LogStage::Forwarding,
                LogComponent::Forwarder,
                "upstream_failed",
                &format!("上游请求失败: {url}: {e}")
            );
            ProxyError::upstream_with_source(
                format!("Can`t proxy request to {}", target.base_url),
                e,
            )
        })?;

        let status = upstream.status();
        let response_headers = strip_hop_by_hop(upstream.headers());

        ldebug!(
            request_id,
            LogStage::Forwarding,
            LogComponent::Forwarder,
            "upstream_responded",
            &format!("上游响应: {status} <- {url}")
        );

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// 去掉逐跳头以及 `Connection` 中声明的头
fn strip_hop_by_hop(source: &HeaderMap) -> HeaderMap {
    let connection_tokens: HashSet<String> = source
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source {
        let lower = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&lower) || connection_tokens.contains(lower) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_upstream_url_joins_base_path() {
        let base = Url::parse("http://billing.internal:8080/api/").unwrap();
        let url = UpstreamForwarder::build_upstream_url(&base, "/invoices/42", Some("page=2"));
        assert_eq!(url.as_str(), "http://billing.internal:8080/api/invoices/42?page=2");

        let root = Url::parse("http://upstream-a").unwrap();
        let url = UpstreamForwarder::build_upstream_url(&root, "/ping", None);
        assert_eq!(url.as_str(), "http://upstream-a/ping");

        let url = UpstreamForwarder::build_upstream_url(&root, "/", None);
        assert_eq!(url.as_str(), "http://upstream-a/");
    }

    #[test]
    fn test_build_upstream_url_merges_queries() {
        let base = Url::parse("http://upstream-a/v1?key=abc").unwrap();
        let url = UpstreamForwarder::build_upstream_url(&base, "/items", Some("q=1"));
        assert_eq!(url.as_str(), "http://upstream-a/v1/items?key=abc&q=1");
    }

    #[test]
    fn test_strip_hop_by_hop_honours_connection_tokens() {
        let mut source = HeaderMap::new();
        source.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, X-Debug"));
        source.insert("x-debug", HeaderValue::from_static("1"));
        source.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        source.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        source.append("x-multi", HeaderValue::from_static("a"));
        source.append("x-multi", HeaderValue::from_static("b"));

        let headers = strip_hop_by_hop(&source);
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("x-debug").is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers.get_all("x-multi").iter().count(), 2);
    }
}
