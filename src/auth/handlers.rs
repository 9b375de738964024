//! # 登录与首页处理器

use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;

use crate::app::AppContext;
use crate::error::ProxyError;
use crate::logging::{LogComponent, LogStage};
use crate::management::response::{escape_html, render_proxy_error};
use crate::proxy::redirect_permanent;
use crate::session::{ORIGIN_URL_KEY, Session, USER_DATA_KEY, UserSessionData, current_user};
use crate::{linfo, lerror};

const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Login</title></head>
<body>
<form method="post" action="/login">
  <input name="username" type="text" placeholder="Username" autofocus />
  <input type="submit" value="Login" />
</form>
</body>
</html>
"#;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
}

/// 只接受站内路径，避免被用作开放跳转
fn safe_origin(origin: Option<String>) -> String {
    origin
        .filter(|url| url.starts_with('/') && !url.starts_with("//"))
        .unwrap_or_else(|| "/".to_string())
}

/// GET /login
pub async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

/// POST /login
///
/// 签发令牌，重置会话后保存用户数据，再跳回登录前的页面。
pub async fn login_submit(
    State(ctx): State<AppContext>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let username = form.username.trim();
    if username.is_empty() {
        return render_proxy_error(&ProxyError::validation(
            "Username must not be empty",
            Some("username"),
        ));
    }

    let origin = safe_origin(session.pop::<String>(ORIGIN_URL_KEY));

    let token = match ctx.tokens.issue(username) {
        Ok(token) => token,
        Err(e) => {
            lerror!(
                "system",
                LogStage::Authentication,
                LogComponent::Auth,
                "issue_token_failed",
                &format!("签发令牌失败: {e}")
            );
            return render_proxy_error(&e);
        }
    };

    session.destroy();
    let data = UserSessionData {
        username: username.to_string(),
        token,
    };
    if let Err(e) = session.put(USER_DATA_KEY, &data) {
        return render_proxy_error(&e);
    }

    linfo!(
        "system",
        LogStage::Authentication,
        LogComponent::Auth,
        "user_login",
        &format!("用户登录: {username}, 跳转到 {origin}")
    );
    redirect_permanent(&origin)
}

/// GET /logout
pub async fn logout(session: Session) -> Response {
    session.destroy();
    redirect_permanent("/")
}

/// GET /
///
/// 列出已注册的分叉与当前用户
pub async fn index_page(State(ctx): State<AppContext>, session: Session) -> Response {
    let mut rows = String::new();
    for target in ctx.targets.iter() {
        let fork = escape_html(&target.fork);
        rows.push_str(&format!(
            "  <li><a href=\"{fork}/\">{fork}</a> &rarr; {} <small>({})</small></li>\n",
            escape_html(target.base_url.as_str()),
            escape_html(target.identity.as_str())
        ));
    }

    let user = if ctx.config.auth.enabled {
        current_user(&session)
            .map(|user| {
                format!(
                    "<p class=\"user\">{} <a href=\"/logout\">Logout</a></p>\n",
                    escape_html(&user.username)
                )
            })
            .unwrap_or_default()
    } else {
        String::new()
    };

    let page = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Stub Router</title></head>\n<body>\n\
         {user}<h1>Targets</h1>\n<ul class=\"targets\">\n{rows}</ul>\n</body>\n</html>\n"
    );
    (StatusCode::OK, Html(page)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_origin() {
        assert_eq!(safe_origin(Some("/a/ping".to_string())), "/a/ping");
        assert_eq!(safe_origin(Some("//evil.example".to_string())), "/");
        assert_eq!(safe_origin(Some("http://evil.example".to_string())), "/");
        assert_eq!(safe_origin(None), "/");
    }
}
