//! # 请求分发
//!
//! 决定一个代理请求的去向：未知分叉、补斜杠重定向、返回桩或转发到上游。
//! 存储读失败不影响代理，按未命中处理。

use std::borrow::Cow;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::response::Response;

use super::forwarding::UpstreamForwarder;
use super::stub_response::build_stub_response;
use super::targets::{Target, TargetRegistry};
use crate::logging::{LogComponent, LogStage};
use crate::management::response::{render_error_page, render_proxy_error};
use crate::stubs::{StubRecord, StubStorage};
use crate::{ldebug, linfo, lwarn};

/// 分发决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchDecision<'a> {
    /// 分叉未注册
    TargetNotFound,
    /// 请求路径恰好是分叉本身，补 `/` 后重定向
    RedirectToFork { location: String },
    /// 命中桩
    ServeStub {
        target: &'a Target,
        upstream_path: String,
        record: StubRecord,
    },
    /// 转发到上游
    Forward {
        target: &'a Target,
        upstream_path: String,
    },
}

/// 请求分发器
pub struct Dispatcher {
    registry: Arc<TargetRegistry>,
    storage: Arc<dyn StubStorage>,
    forwarder: UpstreamForwarder,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<TargetRegistry>,
        storage: Arc<dyn StubStorage>,
        forwarder: UpstreamForwarder,
    ) -> Self {
        Self {
            registry,
            storage,
            forwarder,
        }
    }

    /// 计算分发决定，不产生任何网络请求
    ///
    /// `path` 为原始（未解码）请求路径。分叉与桩按解码后的路径匹配，
    /// 转发时沿用原始编码的上游路径。
    pub async fn decide(
        &self,
        request_id: &str,
        path: &str,
        query: Option<&str>,
    ) -> DispatchDecision<'_> {
        let decoded = urlencoding::decode(path).unwrap_or(Cow::Borrowed(path));
        let Some(target) = self.registry.resolve(&decoded) else {
            return DispatchDecision::TargetNotFound;
        };

        if decoded == target.fork.as_str() {
            let location = match query {
                Some(query) if !query.is_empty() => format!("{path}/?{query}"),
                _ => format!("{path}/"),
            };
            return DispatchDecision::RedirectToFork { location };
        }

        let stub_path = TargetRegistry::strip_fork(&decoded, &target.fork).to_string();
        let raw_upstream_path =
            TargetRegistry::strip_fork(path, TargetRegistry::fork_of(path)).to_string();

        match self.storage.get_stub_map(&target.identity).await {
            Ok(mut stubs) => match stubs.remove(&stub_path) {
                Some(record) => DispatchDecision::ServeStub {
                    target,
                    upstream_path: stub_path,
                    record,
                },
                None => DispatchDecision::Forward {
                    target,
                    upstream_path: raw_upstream_path,
                },
            },
            Err(e) => {
                if !e.is_not_found() {
                    lwarn!(
                        request_id,
                        LogStage::Dispatch,
                        LogComponent::Dispatcher,
                        "stub_lookup_failed",
                        &format!("读取桩失败，按未命中转发: {} ({e})", target.identity)
                    );
                }
                DispatchDecision::Forward {
                    target,
                    upstream_path: raw_upstream_path,
                }
            }
        }
    }

    /// 处理一个代理请求
    ///
    /// `bearer` 为会话中保存的令牌，存在时作为 `Authorization: Bearer` 发往上游。
    pub async fn dispatch(&self, request: Request<Body>, bearer: Option<&str>) -> Response {
        let request_id = uuid::Uuid::new_v4().to_string();
        let path = request.uri().path().to_string();
        let query = request.uri().query().map(str::to_string);

        ldebug!(
            &request_id,
            LogStage::RequestStart,
            LogComponent::Dispatcher,
            "dispatch_start",
            &format!("{} {}", request.method(), request.uri())
        );

        match self.decide(&request_id, &path, query.as_deref()).await {
            DispatchDecision::TargetNotFound => {
                linfo!(
                    &request_id,
                    LogStage::Dispatch,
                    LogComponent::Dispatcher,
                    "target_not_found",
                    &format!("未注册的分叉: {path}")
                );
                render_error_page(
                    StatusCode::NOT_FOUND,
                    &format!("Target path '{path}' not found"),
                )
            }
            DispatchDecision::RedirectToFork { location } => redirect_permanent(&location),
            DispatchDecision::ServeStub {
                target,
                upstream_path,
                record,
            } => {
                linfo!(
                    &request_id,
                    LogStage::StubResponse,
                    LogComponent::Dispatcher,
                    "serve_stub",
                    &format!(
                        "返回桩响应: {} {} -> {}",
                        target.identity, upstream_path, record.status_code
                    )
                );
                build_stub_response(&record)
            }
            DispatchDecision::Forward {
                target,
                upstream_path,
            } => match self
                .forwarder
                .forward(&request_id, target, &upstream_path, request, bearer)
                .await
            {
                Ok(response) => response,
                Err(e) => render_proxy_error(&e),
            },
        }
    }
}

/// 301 永久重定向
#[must_use]
pub fn redirect_permanent(location: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}
