//! 令牌编解码。
//!
//! Access Token 为 HS256 JWT，无需查库即可验证；Refresh Token 为 32 字节随机串，
//! 含义完全由服务端记录决定。

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};

use crate::error::AuthError;
use crate::models::user::Claims;

/// Access Token 有效期（秒）
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
const REFRESH_TOKEN_BYTES: usize = 32;

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: i64,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // 过期在 verify_at 中按显式时间判断，不留容差
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl: ACCESS_TOKEN_TTL_SECS,
        }
    }

    pub fn access_ttl(&self) -> i64 {
        self.access_ttl
    }

    pub fn issue_access_token(
        &self,
        user_id: i32,
        email: &str,
        roles: &[String],
    ) -> Result<String, AuthError> {
        self.issue_access_token_at(user_id, email, roles, Utc::now().timestamp())
    }

    pub fn issue_access_token_at(
        &self,
        user_id: i32,
        email: &str,
        roles: &[String],
        issued_at: i64,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            user_id,
            email: email.to_string(),
            roles: roles.to_vec(),
            iat: issued_at,
            exp: issued_at + self.access_ttl,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("token encoding failed: {}", e)))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_access_token_at(token, Utc::now().timestamp())
    }

    /// 校验签名与结构，再以 `now` 判断过期：`now <= exp` 视为有效
    pub fn verify_access_token_at(&self, token: &str, now: i64) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Malformed,
            }
        })?;

        if now > data.claims.exp {
            return Err(AuthError::Expired);
        }
        Ok(data.claims)
    }
}

/// 生成 256 位熵的 URL 安全随机串
pub fn issue_refresh_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::Internal(format!("random source failed: {}", e)))?;
    Ok(URL_SAFE.encode(bytes))
}
