//! 集成测试公共工具：用内存存储和内存会话组装完整路由

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, header};
use axum::response::Response;
use stub_router::app::{AppContext, create_router};
use stub_router::config::AppConfig;
use stub_router::session::{MemorySessionStore, SessionManager};
use stub_router::stubs::{MemoryStubStorage, StubStorage};

pub const TOKEN_SECRET: &str = "integration-secret";

pub fn config(targets: &[(&str, &str)], auth_enabled: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.enabled = auth_enabled;
    config.session.token_secret = TOKEN_SECRET.to_string();
    for (fork, url) in targets {
        config.targets.insert((*fork).to_string(), (*url).to_string());
    }
    config
}

pub fn app_with_storage(config: AppConfig, storage: Arc<dyn StubStorage>) -> Router {
    let sessions = Arc::new(SessionManager::new(
        Arc::new(MemorySessionStore::new(None)),
        "sessid",
        Duration::from_secs(3600),
    ));
    let context = AppContext::new(Arc::new(config), storage, sessions).expect("context");
    create_router(context)
}

/// 返回路由与其背后的内存存储
pub fn app(targets: &[(&str, &str)], auth_enabled: bool) -> (Router, Arc<MemoryStubStorage>) {
    let storage = Arc::new(MemoryStubStorage::new());
    let router = app_with_storage(config(targets, auth_enabled), storage.clone());
    (router, storage)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

/// 从 `Set-Cookie` 中取出 `sessid=<token>`
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .find(|pair| pair.starts_with("sessid=") && pair.len() > "sessid=".len())
        .map(str::to_string)
}
