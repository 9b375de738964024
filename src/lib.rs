//! # Stub Router Library
//!
//! 带桩能力的反向代理核心库：按首段路径分叉到上游，命中桩时返回预置响应，
//! 否则原样转发；桩存储可选文件、Redis 或内存，并支持读缓存。

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod management;
pub mod proxy;
pub mod session;
pub mod stubs;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{ProxyError, Result};
