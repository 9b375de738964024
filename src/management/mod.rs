//! # 管理API模块
//!
//! 桩管理接口与统一的响应格式

pub mod handlers;
pub mod response;
pub mod routes;

pub use routes::stub_api_routes;
