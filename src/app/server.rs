//! # HTTP 服务器
//!
//! 组装全部路由与中间件并监听端口：
//! 登录页、桩管理接口不经过登录校验；首页与代理分叉在开启 `auth.enabled` 时需要登录。

use std::any::Any;
use std::time::Duration;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::Response;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use super::context::AppContext;
use crate::auth::{auth_gate, handlers};
use crate::error::{Context, Result};
use crate::logging::{LogComponent, LogStage};
use crate::management::response::render_error_page;
use crate::management::stub_api_routes;
use crate::session::{Session, current_user, session_middleware};
use crate::{ldebug, lerror, linfo};

/// 过期会话清理周期
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// 代理入口：所有未匹配到内置路由的请求
async fn proxy_handler(
    State(ctx): State<AppContext>,
    session: Session,
    request: Request,
) -> Response {
    let bearer = current_user(&session).map(|user| user.token);
    ctx.dispatcher.dispatch(request, bearer.as_deref()).await
}

/// 处理器 panic 时渲染通用错误页
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(message) = err.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = err.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "Server error".to_string()
    };

    lerror!(
        "system",
        LogStage::ResponseFailure,
        LogComponent::ServerSetup,
        "handler_panic",
        &format!("请求处理 panic: {message}")
    );
    render_error_page(StatusCode::INTERNAL_SERVER_ERROR, &message)
}

/// 创建路由器
pub fn create_router(context: AppContext) -> Router {
    let gated = Router::new()
        .route("/", get(handlers::index_page))
        .fallback(proxy_handler)
        .layer(from_fn_with_state(context.clone(), auth_gate));

    let open = Router::new()
        .route("/login", get(handlers::login_page).post(handlers::login_submit))
        .route("/logout", get(handlers::logout))
        .merge(stub_api_routes());

    open.merge(gated)
        .layer(from_fn_with_state(
            context.sessions.clone(),
            session_middleware,
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

/// 服务器
pub struct StubRouterServer {
    context: AppContext,
    router: Router,
}

impl StubRouterServer {
    #[must_use]
    pub fn new(context: AppContext) -> Self {
        let router = create_router(context.clone());
        Self { context, router }
    }

    /// 启动服务器，收到 Ctrl+C 后优雅退出
    pub async fn serve(self) -> Result<()> {
        let addr = self.context.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("无法监听地址 {addr}"))?;

        let store = self.context.sessions.store().clone();
        let purge = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
            loop {
                ticker.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    ldebug!(
                        "system",
                        LogStage::Authentication,
                        LogComponent::Session,
                        "sessions_purged",
                        &format!("清理过期会话: {purged}")
                    );
                }
            }
        });

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "server_start",
            &format!(
                "stub-router 已启动: http://{addr}, targets={}, storage={}, auth={}",
                self.context.targets.len(),
                self.context.storage.backend_name(),
                self.context.config.auth.enabled
            )
        );

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                linfo!(
                    "system",
                    LogStage::Shutdown,
                    LogComponent::ServerSetup,
                    "shutdown_signal",
                    "收到退出信号，正在停止服务"
                );
            })
            .await
            .context("HTTP 服务异常退出");

        purge.abort();
        result
    }
}
