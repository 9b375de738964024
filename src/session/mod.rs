//! # 会话模块
//!
//! cookie 传递令牌的服务端会话，保存登录用户与登录前的原始路径

pub mod handle;
pub mod manager;
pub mod store;

pub use handle::{Session, SessionStatus};
pub use manager::{
    ORIGIN_URL_KEY, SessionManager, USER_DATA_KEY, UserSessionData, current_user,
    session_middleware,
};
pub use store::{MemorySessionStore, SessionStore, SessionValues};
