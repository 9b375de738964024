//! # 路由配置

use axum::Router;
use axum::routing::get;

use crate::app::AppContext;
use crate::management::handlers::stubs;

/// 桩管理路由，挂在 `/stubapi/`
pub fn stub_api_routes() -> Router<AppContext> {
    let handlers = get(stubs::get_stubs)
        .post(stubs::save_stub)
        .delete(stubs::delete_stub);

    Router::new()
        .route("/stubapi/", handlers.clone())
        .route("/stubapi", handlers)
}
