//! # 错误处理宏

/// 按变体名快速构造 `ProxyError`
///
/// ```ignore
/// error!(Config, "端口无效: {}", port)
/// ```
#[macro_export]
macro_rules! error {
    (Config, $($arg:tt)+) => {
        $crate::error::ProxyError::config(format!($($arg)+))
    };
    (Backend, $($arg:tt)+) => {
        $crate::error::ProxyError::backend(format!($($arg)+))
    };
    (Upstream, $($arg:tt)+) => {
        $crate::error::ProxyError::upstream(format!($($arg)+))
    };
    (Auth, $($arg:tt)+) => {
        $crate::error::ProxyError::auth(format!($($arg)+))
    };
    (Internal, $($arg:tt)+) => {
        $crate::error::ProxyError::internal(format!($($arg)+))
    };
}

/// 直接返回错误
#[macro_export]
macro_rules! bail {
    ($kind:ident, $($arg:tt)+) => {
        return Err($crate::error!($kind, $($arg)+))
    };
    ($err:expr $(,)?) => {
        return Err(::core::convert::Into::into($err))
    };
}

/// 确保条件成立，否则返回给定错误
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $kind:ident, $($arg:tt)+) => {
        if !($cond) {
            $crate::bail!($kind, $($arg)+);
        }
    };
    ($cond:expr, $err:expr $(,)?) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
}

/// 确保条件成立，否则返回配置错误
#[macro_export]
macro_rules! ensure_config {
    ($cond:expr, $($arg:tt)+) => {
        if !($cond) {
            return Err($crate::error::ProxyError::config(format!($($arg)+)));
        }
    };
}
