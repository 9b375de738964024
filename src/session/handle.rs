//! 请求级会话句柄

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::store::SessionValues;
use crate::error::{ProxyError, Result};

/// 会话在本次请求中的变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unmodified,
    Modified,
    Destroyed,
}

#[derive(Debug)]
pub(crate) struct SessionInner {
    pub(crate) token: Option<String>,
    pub(crate) values: SessionValues,
    pub(crate) status: SessionStatus,
    /// 销毁后又写入时需要换新令牌
    pub(crate) renew: bool,
}

/// 会话句柄，由会话中间件放入请求扩展
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    pub(crate) fn new(token: Option<String>, values: SessionValues) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                token,
                values,
                status: SessionStatus::Unmodified,
                renew: false,
            })),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 读取并反序列化一个值
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let inner = self.lock();
        inner
            .values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// 写入一个值
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| ProxyError::internal_with_source(format!("会话值无法序列化: {key}"), e))?;
        let mut inner = self.lock();
        inner.values.insert(key.to_string(), value);
        if inner.status == SessionStatus::Destroyed {
            inner.renew = true;
        }
        inner.status = SessionStatus::Modified;
        Ok(())
    }

    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        self.lock().values.contains_key(key)
    }

    /// 读取后删除
    pub fn pop<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut inner = self.lock();
        let value = inner.values.remove(key)?;
        if inner.status != SessionStatus::Destroyed {
            inner.status = SessionStatus::Modified;
        }
        serde_json::from_value(value).ok()
    }

    /// 清空会话，响应时删除存储中的记录
    pub fn destroy(&self) {
        let mut inner = self.lock();
        inner.values.clear();
        inner.status = SessionStatus::Destroyed;
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "session layer missing"))
    }
}
