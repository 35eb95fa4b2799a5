use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::AuthError;
use crate::models::role::{self, Role};
use crate::services::token::TokenCodec;
use crate::AppState;

/// 守卫通过后挂在请求上的身份信息
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub user_id: i32,
    pub email: String,
    pub roles: Vec<String>,
}

/// RequireRole 的允许角色列表
#[derive(Debug, Clone, Copy)]
pub struct RequiredRoles(pub &'static [Role]);

/// 解析 `Authorization: Bearer <token>` 并验证令牌
pub fn authorize(auth_header: Option<&str>, codec: &TokenCodec) -> Result<Identity, AuthError> {
    let auth_header = auth_header.ok_or(AuthError::MissingToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty() && !t.contains(char::is_whitespace))
        .ok_or(AuthError::InvalidAuthHeader)?;

    let claims = codec.verify_access_token(token)?;

    Ok(Identity {
        user_id: claims.user_id,
        email: claims.email,
        roles: claims.roles,
    })
}

pub fn check_roles(held: &[String], allowed: &[Role]) -> Result<(), AuthError> {
    if role::intersects(held, allowed) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// 认证守卫
pub async fn guard(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    // 1. 提取 Authorization Header，非 ASCII 按格式错误处理
    let auth_header = match req.headers().get(header::AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?),
        None => None,
    };

    // 2. 验证令牌
    let identity = authorize(auth_header, &state.codec)?;
    tracing::debug!(user_id = identity.user_id, "请求认证通过");

    // 3. 身份写入请求上下文
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// 角色守卫，必须挂在 [`guard`] 之后
pub async fn require_role(
    State(allowed): State<RequiredRoles>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = req
        .extensions()
        .get::<Identity>()
        .ok_or(AuthError::MissingIdentity)?;

    if let Err(e) = check_roles(&identity.roles, allowed.0) {
        tracing::warn!(
            user_id = identity.user_id,
            roles = ?identity.roles,
            required = ?allowed.0,
            "权限不足"
        );
        return Err(e);
    }
    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AuthError::MissingIdentity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-key-for-jwt-testing-minimum-32-chars";

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        let codec = TokenCodec::new(TEST_SECRET);

        assert!(matches!(authorize(None, &codec), Err(AuthError::MissingToken)));
        for bad in ["", "Bearer", "Bearer ", "bearer abc", "Basic abc", "Token abc", "Bearer a b"] {
            assert!(
                matches!(authorize(Some(bad), &codec), Err(AuthError::InvalidAuthHeader)),
                "header {:?} should be rejected before verification",
                bad
            );
        }
    }

    #[test]
    fn test_valid_bearer_yields_identity() {
        let codec = TokenCodec::new(TEST_SECRET);
        let token = codec
            .issue_access_token(5, "s@example.com", &roles(&["user", "seller"]))
            .unwrap();

        let identity = authorize(Some(format!("Bearer {}", token).as_str()), &codec).unwrap();
        assert_eq!(identity.user_id, 5);
        assert_eq!(identity.email, "s@example.com");
        assert_eq!(identity.roles, roles(&["user", "seller"]));
    }

    #[test]
    fn test_invalid_token_rejected() {
        let codec = TokenCodec::new(TEST_SECRET);
        let err = authorize(Some("Bearer invalid.token.here"), &codec).unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[test]
    fn test_require_admin() {
        assert!(matches!(
            check_roles(&roles(&["user", "seller"]), &[Role::Admin]),
            Err(AuthError::Forbidden)
        ));
        assert!(check_roles(&roles(&["user", "seller", "admin"]), &[Role::Admin]).is_ok());
        assert!(check_roles(&roles(&["user", "seller"]), &[Role::Seller, Role::Admin]).is_ok());
        assert!(check_roles(&roles(&["user"]), &[Role::Seller, Role::Admin]).is_err());
    }
}
