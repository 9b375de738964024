//! JWT 签发
//!
//! 登录时为用户签发 HS256 令牌，代理转发时作为 `Authorization: Bearer` 发给上游。
//! 载荷只有用户名字段（字段名可配置）和签发时间。

use std::collections::HashSet;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::{Map, Value};

use crate::config::SessionConfig;
use crate::error::{ProxyError, Result};

/// 令牌签发器
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    userid_field: String,
}

impl TokenIssuer {
    pub fn new(secret: &str, userid_field: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            userid_field: userid_field.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.token_secret, config.userid_field.clone())
    }

    /// 为用户签发令牌
    pub fn issue(&self, username: &str) -> Result<String> {
        let mut claims = Map::new();
        claims.insert(self.userid_field.clone(), Value::String(username.to_string()));
        claims.insert("iat".to_string(), Value::from(Utc::now().timestamp()));

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ProxyError::auth_with_source(format!("签发令牌失败: {username}"), e))
    }

    /// 校验签名并取出用户名
    pub fn verify(&self, token: &str) -> Result<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;

        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &validation)?;
        data.claims
            .get(&self.userid_field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProxyError::auth(format!("令牌缺少字段: {}", self.userid_field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let issuer = TokenIssuer::new("secret", "sub");
        let token = issuer.issue("alice").unwrap();
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(issuer.verify(&token).unwrap(), "alice");
    }

    #[test]
    fn test_custom_userid_field() {
        let issuer = TokenIssuer::new("secret", "login");
        let token = issuer.issue("bob").unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), "bob");

        let other = TokenIssuer::new("secret", "sub");
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = TokenIssuer::new("secret", "sub").issue("alice").unwrap();
        let err = TokenIssuer::new("other", "sub").verify(&token).unwrap_err();
        assert!(matches!(err, ProxyError::Auth { .. }));
    }
}
