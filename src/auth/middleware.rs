//! # 登录校验中间件
//!
//! 开启 `auth.enabled` 后，没有登录数据的请求先记下原始路径，再重定向到 `/login`。

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::app::AppContext;
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use crate::proxy::redirect_permanent;
use crate::session::{ORIGIN_URL_KEY, Session, USER_DATA_KEY};

/// Axum 登录校验中间件
pub async fn auth_gate(
    State(ctx): State<AppContext>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    if !ctx.config.auth.enabled || session.exists(USER_DATA_KEY) {
        return next.run(request).await;
    }

    let origin = request.uri().path().to_string();
    ldebug!(
        "system",
        LogStage::Authentication,
        LogComponent::Auth,
        "login_required",
        &format!("未登录，跳转登录页: {origin}")
    );

    match session.put(ORIGIN_URL_KEY, &origin) {
        Ok(()) => redirect_permanent("/login"),
        Err(e) => crate::management::response::render_proxy_error(&e),
    }
}
