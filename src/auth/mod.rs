//! # 认证模块
//!
//! 令牌签发、登录/登出页面与登录校验中间件

pub mod handlers;
pub mod jwt;
pub mod middleware;

pub use jwt::TokenIssuer;
pub use middleware::auth_gate;
