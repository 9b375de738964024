//! 会话存储

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// 会话中的键值
pub type SessionValues = HashMap<String, serde_json::Value>;

/// 会话存储后端，按会话令牌寻址
pub trait SessionStore: Send + Sync {
    /// 读取未过期的会话
    fn find(&self, token: &str) -> Option<SessionValues>;

    /// 写入会话，`lifetime` 为自创建起的绝对有效期
    fn commit(&self, token: &str, values: SessionValues, lifetime: Duration);

    /// 刷新最近访问时间
    fn touch(&self, token: &str);

    /// 删除会话
    fn delete(&self, token: &str);

    /// 清理过期会话，返回清理数量
    fn purge_expired(&self) -> usize;
}

struct StoredSession {
    values: SessionValues,
    deadline: Instant,
    last_seen: Instant,
}

impl StoredSession {
    fn is_expired(&self, now: Instant, idle: Option<Duration>) -> bool {
        now >= self.deadline
            || idle.is_some_and(|idle| now.duration_since(self.last_seen) >= idle)
    }
}

/// 进程内会话存储
pub struct MemorySessionStore {
    sessions: DashMap<String, StoredSession>,
    idle_timeout: Option<Duration>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn find(&self, token: &str) -> Option<SessionValues> {
        let now = Instant::now();
        let expired = match self.sessions.get(token) {
            Some(session) if !session.is_expired(now, self.idle_timeout) => {
                return Some(session.values.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.sessions.remove(token);
        }
        None
    }

    fn commit(&self, token: &str, values: SessionValues, lifetime: Duration) {
        let now = Instant::now();
        self.sessions
            .entry(token.to_string())
            .and_modify(|session| {
                session.values.clone_from(&values);
                session.last_seen = now;
            })
            .or_insert_with(|| StoredSession {
                values: values.clone(),
                deadline: now + lifetime,
                last_seen: now,
            });
    }

    fn touch(&self, token: &str) {
        if let Some(mut session) = self.sessions.get_mut(token) {
            session.last_seen = Instant::now();
        }
    }

    fn delete(&self, token: &str) {
        self.sessions.remove(token);
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.is_expired(now, self.idle_timeout));
        before.saturating_sub(self.sessions.len())
    }
}
