//! # 错误处理测试

use crate::error::{Context, ErrorCategory, ProxyError};
use axum::http::StatusCode;
use std::error::Error;

#[test]
fn test_config_error_creation() {
    let err = ProxyError::config("测试配置错误");
    assert!(matches!(err, ProxyError::Config { .. }));
    assert_eq!(err.to_string(), "配置错误: 测试配置错误");
}

#[test]
fn test_config_error_with_source() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "文件不存在");
    let err = ProxyError::config_with_source("配置文件加载失败", io_err);

    assert!(matches!(err, ProxyError::Config { .. }));
    assert!(err.to_string().contains("配置错误: 配置文件加载失败"));
    assert!(err.source().is_some());
}

#[test]
fn test_not_found_error() {
    let err = ProxyError::not_found("stub", "/ping");
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "资源未找到: stub /ping");
    assert_eq!(err.to_http_response_parts().0, StatusCode::NOT_FOUND);
    assert_eq!(err.category(), ErrorCategory::Client);
}

#[test]
fn test_status_mapping() {
    let cases = [
        (ProxyError::backend("boom"), StatusCode::INTERNAL_SERVER_ERROR, "BACKEND_ERROR"),
        (ProxyError::upstream("down"), StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
        (
            ProxyError::validation("code 必须为整数", Some("code")),
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
        ),
        (ProxyError::auth("签名失败"), StatusCode::INTERNAL_SERVER_ERROR, "AUTH_ERROR"),
    ];

    for (err, status, code) in cases {
        assert_eq!(err.to_http_response_parts(), (status, code));
    }
}

#[test]
fn test_auto_conversion_from_io_error() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "文件不存在");
    let proxy_err: ProxyError = io_err.into();

    assert!(matches!(proxy_err, ProxyError::Io { .. }));
    assert!(proxy_err.to_string().contains("IO错误: 文件操作失败"));
}

#[test]
fn test_auto_conversion_from_toml_error() {
    let invalid_toml = "invalid = toml = syntax";
    let toml_err = toml::from_str::<toml::Value>(invalid_toml).unwrap_err();
    let proxy_err: ProxyError = toml_err.into();

    assert!(matches!(proxy_err, ProxyError::Config { .. }));
    assert!(proxy_err.to_string().contains("配置错误: TOML解析失败"));
}

#[test]
fn test_auto_conversion_from_yaml_error() {
    let yaml_err = serde_yaml::from_str::<Vec<u32>>("service: [").unwrap_err();
    let proxy_err: ProxyError = yaml_err.into();
    assert!(matches!(proxy_err, ProxyError::Serialization { .. }));
}

#[test]
fn test_context_wraps_source() {
    let result: Result<(), std::io::Error> = Err(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "权限不足",
    ));

    let err = result.context("读取桩文件失败").unwrap_err();
    assert!(matches!(err, ProxyError::Internal { .. }));
    assert!(err.to_string().contains("读取桩文件失败"));
    assert!(err.source().unwrap().to_string().contains("权限不足"));
}

#[test]
fn test_ensure_macro_returns_error() {
    fn check(port: u16) -> crate::error::Result<u16> {
        crate::ensure!(port != 0, Config, "无效的服务器端口: {}", port);
        Ok(port)
    }

    assert_eq!(check(3333).unwrap(), 3333);
    let err = check(0).unwrap_err();
    assert_eq!(err.to_string(), "配置错误: 无效的服务器端口: 0");
}
