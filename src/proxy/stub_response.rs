//! 把桩渲染为 HTTP 响应
//!
//! 状态码和响应头立即返回；模拟延迟放在响应体流里，客户端断开时随流一起被丢弃。

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;

use crate::logging::{LogComponent, LogStage};
use crate::lwarn;
use crate::stubs::StubRecord;

/// 构造桩响应
#[must_use]
pub fn build_stub_response(record: &StubRecord) -> Response {
    let status = StatusCode::from_u16(record.status_code).unwrap_or_else(|_| {
        lwarn!(
            "system",
            LogStage::StubResponse,
            LogComponent::Dispatcher,
            "invalid_stub_status",
            &format!("桩状态码无效，改用 500: {}", record.status_code)
        );
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let body = if record.delay_millis == 0 {
        Body::from(record.body.clone())
    } else {
        let delay = Duration::from_millis(record.delay_millis);
        let payload = Bytes::from(record.body.clone());
        Body::from_stream(futures::stream::once(async move {
            tokio::time::sleep(delay).await;
            Ok::<_, Infallible>(payload)
        }))
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in &record.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => {
                lwarn!(
                    "system",
                    LogStage::StubResponse,
                    LogComponent::Dispatcher,
                    "invalid_stub_header",
                    &format!("忽略无效的桩响应头: {name}")
                );
            }
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_status_headers_and_body() {
        let record = StubRecord::new(418, "teapot").with_header("X-Mock", "yes");
        let response = build_stub_response(&record);

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()["x-mock"], "yes");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"teapot");
    }

    #[tokio::test]
    async fn test_delay_applies_before_body() {
        let record = StubRecord::new(200, "late").with_delay(150);
        let started = Instant::now();
        let response = build_stub_response(&record);
        // 状态码与头不等待延迟
        assert!(started.elapsed() < Duration::from_millis(100));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(&body[..], b"late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_body_cancels_delay() {
        let record = StubRecord::new(200, "never").with_delay(60_000);
        let started = tokio::time::Instant::now();
        let response = build_stub_response(&record);
        assert_eq!(response.status(), StatusCode::OK);

        // 客户端放弃读取：响应体随之丢弃
        let read = tokio::time::timeout(
            Duration::from_millis(50),
            axum::body::to_bytes(response.into_body(), usize::MAX),
        )
        .await;
        assert!(read.is_err());
        assert!(started.elapsed() < Duration::from_secs(1));

        // 延迟只存在于响应体里，没有遗留的后台任务
        let metrics = tokio::runtime::Handle::current().metrics();
        assert_eq!(metrics.num_alive_tasks(), 0);
    }

    #[test]
    fn test_invalid_header_is_skipped() {
        let record = StubRecord::new(200, "")
            .with_header("bad header", "x")
            .with_header("X-Ok", "1");
        let response = build_stub_response(&record);
        assert_eq!(response.headers().len(), 1);
    }
}
