//! # 会话管理
//!
//! 通过 cookie 传递会话令牌：请求进入时加载会话并放入请求扩展，
//! 响应返回前根据会话变化写回存储并设置 cookie。

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};

use super::handle::{Session, SessionStatus};
use super::store::{SessionStore, SessionValues};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lwarn};

/// 登录后保存在会话中的键
pub const USER_DATA_KEY: &str = "userData";
/// 登录前被拦截的原始路径
pub const ORIGIN_URL_KEY: &str = "originUrl";

/// 登录用户数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSessionData {
    pub username: String,
    pub token: String,
}

/// 会话管理器
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cookie_name: String,
    lifetime: Duration,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        cookie_name: impl Into<String>,
        lifetime: Duration,
    ) -> Self {
        Self {
            store,
            cookie_name: cookie_name.into(),
            lifetime,
        }
    }

    /// 按配置创建（进程内存储）
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let store = Arc::new(super::MemorySessionStore::new(config.idle()?));
        Ok(Self::new(store, config.cookie_name.clone(), config.lifetime()?))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// 从 `Cookie` 头中取出会话令牌
    #[must_use]
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// 加载会话；令牌未知或已过期时得到一个空会话
    #[must_use]
    pub fn load(&self, token: Option<String>) -> Session {
        match token {
            Some(token) => match self.store.find(&token) {
                Some(values) => Session::new(Some(token), values),
                None => Session::new(None, SessionValues::new()),
            },
            None => Session::new(None, SessionValues::new()),
        }
    }

    /// 把会话变化写回存储，返回需要下发的 `Set-Cookie`
    pub fn commit(&self, session: &Session) -> Option<HeaderValue> {
        let mut inner = session.lock();
        match inner.status {
            SessionStatus::Unmodified => {
                if let Some(token) = &inner.token {
                    self.store.touch(token);
                }
                None
            }
            SessionStatus::Destroyed => {
                let token = inner.token.take()?;
                self.store.delete(&token);
                ldebug!(
                    "system",
                    LogStage::Authentication,
                    LogComponent::Session,
                    "session_destroyed",
                    "会话已销毁"
                );
                self.cookie_header("", Duration::ZERO)
            }
            SessionStatus::Modified => {
                if inner.renew {
                    if let Some(old) = inner.token.take() {
                        self.store.delete(&old);
                    }
                }
                let token = inner
                    .token
                    .get_or_insert_with(|| uuid::Uuid::new_v4().simple().to_string())
                    .clone();
                self.store.commit(&token, inner.values.clone(), self.lifetime);
                self.cookie_header(&token, self.lifetime)
            }
        }
    }

    fn cookie_header(&self, token: &str, max_age: Duration) -> Option<HeaderValue> {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.cookie_name,
            token,
            max_age.as_secs()
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => Some(value),
            Err(e) => {
                lwarn!(
                    "system",
                    LogStage::Authentication,
                    LogComponent::Session,
                    "invalid_cookie",
                    &format!("会话 cookie 无法编码: {e}")
                );
                None
            }
        }
    }
}

/// 会话中间件
pub async fn session_middleware(
    State(manager): State<Arc<SessionManager>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = manager.token_from_headers(request.headers());
    let session = manager.load(token);
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    if let Some(cookie) = manager.commit(&session) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

/// 读取登录用户
#[must_use]
pub fn current_user(session: &Session) -> Option<UserSessionData> {
    session.get(USER_DATA_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(MemorySessionStore::new(None)),
            "sessid",
            Duration::from_secs(3600),
        )
    }

    fn cookie_token(cookie: &HeaderValue) -> String {
        let cookie = cookie.to_str().unwrap();
        cookie
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, token)| token.to_string())
            .unwrap()
    }

    #[test]
    fn test_token_from_headers() {
        let manager = manager();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; sessid=abc123"));
        assert_eq!(manager.token_from_headers(&headers).as_deref(), Some("abc123"));

        headers.insert(header::COOKIE, HeaderValue::from_static("sessid="));
        assert!(manager.token_from_headers(&headers).is_none());
    }

    #[test]
    fn test_modified_session_is_persisted_with_cookie() {
        let manager = manager();
        let session = manager.load(None);
        session
            .put(USER_DATA_KEY, &UserSessionData { username: "alice".into(), token: "jwt".into() })
            .unwrap();

        let cookie = manager.commit(&session).unwrap();
        assert!(cookie.to_str().unwrap().contains("HttpOnly"));
        assert!(cookie.to_str().unwrap().contains("Max-Age=3600"));

        let reloaded = manager.load(Some(cookie_token(&cookie)));
        assert_eq!(current_user(&reloaded).unwrap().username, "alice");
    }

    #[test]
    fn test_unmodified_session_sets_no_cookie() {
        let manager = manager();
        let session = manager.load(Some("unknown".to_string()));
        assert!(manager.commit(&session).is_none());
    }

    #[test]
    fn test_destroy_then_put_rotates_token() {
        let manager = manager();
        let first = manager.load(None);
        first.put(ORIGIN_URL_KEY, &"/a/ping").unwrap();
        let old_token = cookie_token(&manager.commit(&first).unwrap());

        let session = manager.load(Some(old_token.clone()));
        assert_eq!(session.pop::<String>(ORIGIN_URL_KEY).as_deref(), Some("/a/ping"));
        session.destroy();
        session.put(USER_DATA_KEY, &"alice").unwrap();
        let new_token = cookie_token(&manager.commit(&session).unwrap());

        assert_ne!(old_token, new_token);
        assert!(manager.store().find(&old_token).is_none());
        assert!(manager.store().find(&new_token).is_some());
    }

    #[test]
    fn test_destroy_expires_cookie() {
        let manager = manager();
        let first = manager.load(None);
        first.put("k", &1).unwrap();
        let token = cookie_token(&manager.commit(&first).unwrap());

        let session = manager.load(Some(token.clone()));
        session.destroy();
        let cookie = manager.commit(&session).unwrap();
        assert!(cookie.to_str().unwrap().contains("Max-Age=0"));
        assert!(manager.store().find(&token).is_none());
    }
}
