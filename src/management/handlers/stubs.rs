//! # 桩管理处理器
//!
//! `/stubapi/?target=<上游地址>[&path=<路径>]`，直接读写桩存储。
//! 请求体中的数字既可以是数字也可以是字符串，`headers` 可以是对象或其 JSON 字符串。

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Response,
};
use serde::Deserialize;
use serde_json::Value;

use crate::app::AppContext;
use crate::error::{ErrorCategory, ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::management::response;
use crate::stubs::{StubMap, StubRecord, UpstreamIdentity};
use crate::{lerror, linfo, lwarn};

/// 查询参数
#[derive(Debug, Deserialize)]
pub struct StubQuery {
    pub target: Option<String>,
    pub path: Option<String>,
}

impl StubQuery {
    fn identity(&self) -> Result<UpstreamIdentity> {
        let target = self
            .target
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProxyError::validation("缺少参数 target", Some("target")))?;
        UpstreamIdentity::parse(target)
    }

    fn stub_path(&self) -> Result<&str> {
        self.path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ProxyError::validation("缺少参数 path", Some("path")))
    }
}

/// 依次取第一个存在的字段
fn field<'a>(object: &'a serde_json::Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| object.get(*name))
}

/// 整数字段：数字或数字字符串；空字符串视为缺省
fn integer_field(value: Option<&Value>, name: &str) -> Result<Option<i64>> {
    let invalid = || ProxyError::validation(format!("{name} 必须是整数"), Some(name));
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number.as_i64().map(Some).ok_or_else(invalid),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Value::String(raw)) => raw.trim().parse::<i64>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

/// 响应头字段：扁平的字符串映射，或其 JSON 字符串
fn headers_field(value: Option<&Value>) -> Result<BTreeMap<String, String>> {
    let invalid = || ProxyError::validation("headers 必须是字符串到字符串的映射", Some("headers"));
    let object = match value {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::String(raw)) if raw.trim().is_empty() => return Ok(BTreeMap::new()),
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw).map_err(|_| invalid())?,
        Some(other) => other.clone(),
    };

    match object {
        Value::Object(map) => map
            .into_iter()
            .map(|(name, value)| match value {
                Value::String(value) => Ok((name, value)),
                _ => Err(invalid()),
            })
            .collect(),
        Value::Null => Ok(BTreeMap::new()),
        _ => Err(invalid()),
    }
}

/// 解析并校验写入请求体
pub fn parse_stub_payload(body: &[u8]) -> Result<StubRecord> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::validation(format!("请求体不是合法的 JSON: {e}"), None))?;
    let Value::Object(object) = payload else {
        return Err(ProxyError::validation("请求体必须是 JSON 对象", None));
    };

    let code = integer_field(field(&object, &["code", "statusCode"]), "code")?
        .ok_or_else(|| ProxyError::validation("缺少 code", Some("code")))?;
    let status_code = u16::try_from(code)
        .ok()
        .filter(|code| (100..=999).contains(code))
        .ok_or_else(|| ProxyError::validation(format!("code 超出范围 100-999: {code}"), Some("code")))?;

    let timeout =
        integer_field(field(&object, &["timeout", "delayMillis"]), "timeout")?.unwrap_or(0);
    let delay_millis = u64::try_from(timeout)
        .map_err(|_| ProxyError::validation(format!("timeout 不能为负数: {timeout}"), Some("timeout")))?;

    let body = match field(&object, &["data", "body"]) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(data)) => data.clone(),
        Some(_) => return Err(ProxyError::validation("data 必须是字符串", Some("data"))),
    };

    let headers = headers_field(field(&object, &["headers"]))?;

    Ok(StubRecord {
        status_code,
        body,
        headers,
        delay_millis,
    })
}

fn log_rejected(operation: &str, error: &ProxyError) {
    lwarn!(
        "system",
        LogStage::Management,
        LogComponent::StubApi,
        operation,
        &format!("请求被拒绝: {error}")
    );
}

/// 存储操作失败；服务端错误记录日志，`NotFound` 之类直接返回
fn storage_failure(operation: &str, error: ProxyError) -> Response {
    if error.category() == ErrorCategory::Server {
        lerror!(
            "system",
            LogStage::Management,
            LogComponent::StubApi,
            operation,
            &format!("桩存储操作失败: {error:?}")
        );
    }
    response::app_error(error)
}

/// GET /stubapi/
///
/// 只给 `target` 时返回整张桩表（没有桩时为 `{}`），同时给 `path` 时返回单条桩。
pub async fn get_stubs(State(ctx): State<AppContext>, Query(query): Query<StubQuery>) -> Response {
    let identity = match query.identity() {
        Ok(identity) => identity,
        Err(e) => {
            log_rejected("get_stubs", &e);
            return response::app_error(e);
        }
    };

    let stubs = match ctx.storage.get_stub_map(&identity).await {
        Ok(stubs) => stubs,
        Err(e) if e.is_not_found() => StubMap::new(),
        Err(e) => return storage_failure("get_stubs", e),
    };

    match query.path.as_deref().filter(|p| !p.is_empty()) {
        None => response::raw(stubs),
        Some(path) => match stubs.get(path) {
            Some(record) => response::raw(record),
            None => response::app_error(ProxyError::not_found("stub", path)),
        },
    }
}

/// POST /stubapi/
pub async fn save_stub(
    State(ctx): State<AppContext>,
    Query(query): Query<StubQuery>,
    body: Bytes,
) -> Response {
    let request = query
        .identity()
        .and_then(|identity| Ok((identity, query.stub_path()?)))
        .and_then(|(identity, path)| Ok((identity, path, parse_stub_payload(&body)?)));

    let (identity, path, record) = match request {
        Ok(request) => request,
        Err(e) => {
            log_rejected("save_stub", &e);
            return response::app_error(e);
        }
    };

    let status_code = record.status_code;
    match ctx.storage.save_stub(&identity, path, record).await {
        Ok(()) => {
            linfo!(
                "system",
                LogStage::Management,
                LogComponent::StubApi,
                "stub_saved",
                &format!("保存桩: {identity} {path} -> {status_code}")
            );
            response::success_without_data("桩已保存")
        }
        Err(e) => storage_failure("save_stub", e),
    }
}

/// DELETE /stubapi/
pub async fn delete_stub(
    State(ctx): State<AppContext>,
    Query(query): Query<StubQuery>,
) -> Response {
    let request = query
        .identity()
        .and_then(|identity| Ok((identity, query.stub_path()?)));

    let (identity, path) = match request {
        Ok(request) => request,
        Err(e) => {
            log_rejected("delete_stub", &e);
            return response::app_error(e);
        }
    };

    match ctx.storage.remove_stub(&identity, path).await {
        Ok(()) => {
            linfo!(
                "system",
                LogStage::Management,
                LogComponent::StubApi,
                "stub_removed",
                &format!("删除桩: {identity} {path}")
            );
            response::success_without_data("桩已删除")
        }
        Err(e) => storage_failure("delete_stub", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_admin_ui_payload_with_string_fields() {
        let record = parse_stub_payload(
            br#"{"path": "/ping", "code": "201", "timeout": "15", "data": "pong", "headers": "{\"X-Mock\": \"1\"}"}"#,
        )
        .unwrap();
        assert_eq!(
            record,
            StubRecord::new(201, "pong").with_header("X-Mock", "1").with_delay(15)
        );
    }

    #[test]
    fn test_numeric_fields_and_defaults() {
        let record = parse_stub_payload(br#"{"code": 204, "timeout": "", "headers": ""}"#).unwrap();
        assert_eq!(record, StubRecord::new(204, ""));

        let record = parse_stub_payload(br#"{"statusCode": 404, "body": "gone", "headers": {"A": "b"}}"#).unwrap();
        assert_eq!(record, StubRecord::new(404, "gone").with_header("A", "b"));
    }

    #[test]
    fn test_invalid_payloads_are_validation_errors() {
        let cases: &[&[u8]] = &[
            b"not json",
            b"[1, 2]",
            br#"{"timeout": "1"}"#,
            br#"{"code": "abc"}"#,
            br#"{"code": 99}"#,
            br#"{"code": 1000}"#,
            br#"{"code": 200, "timeout": -5}"#,
            br#"{"code": 200, "timeout": 1.5}"#,
            br#"{"code": 200, "headers": "{\"A\": {\"nested\": 1}}"}"#,
            br#"{"code": 200, "headers": "[1]"}"#,
            br#"{"code": 200, "data": 42}"#,
        ];
        for body in cases {
            let err = parse_stub_payload(body).unwrap_err();
            assert!(
                matches!(err, ProxyError::Validation { .. }),
                "应当拒绝: {}",
                String::from_utf8_lossy(body)
            );
        }
    }
}
