//! 认证子系统统一错误类型。
//!
//! 对外只区分 401 / 403 / 404 / 409 / 400 / 500，认证失败的具体原因只写日志，
//! 不回给客户端。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::password::PasswordError;
use crate::services::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// 用户不存在、密码错误或账号停用，三者不可区分
    #[error("invalid username/email or password")]
    InvalidCredentials,
    #[error("authorization header required")]
    MissingToken,
    #[error("invalid authorization header format")]
    InvalidAuthHeader,
    #[error("refresh token not found")]
    TokenNotFound,
    #[error("refresh token has been revoked")]
    TokenRevoked,
    #[error("refresh token has expired")]
    TokenExpired,
    #[error("access token signature mismatch")]
    InvalidSignature,
    #[error("access token has expired")]
    Expired,
    #[error("access token is malformed")]
    Malformed,
    /// Guard 没有先于 RequireRole 运行
    #[error("no identity attached to request")]
    MissingIdentity,
    #[error("you don't have permission to access this resource")]
    Forbidden,
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// 是否属于“未认证”类错误
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::MissingToken
                | AuthError::InvalidAuthHeader
                | AuthError::TokenNotFound
                | AuthError::TokenRevoked
                | AuthError::TokenExpired
                | AuthError::InvalidSignature
                | AuthError::Expired
                | AuthError::Malformed
                | AuthError::MissingIdentity
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            e if e.is_unauthorized() => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (code, message) = if self.is_unauthorized() {
            match &self {
                AuthError::MissingIdentity => {
                    tracing::error!("路由配置错误: RequireRole 前未挂载认证守卫");
                }
                AuthError::InvalidCredentials => tracing::warn!("登录失败: {}", self),
                other => tracing::warn!("认证失败: {}", other),
            }
            let message = match &self {
                AuthError::InvalidCredentials => "Invalid username/email or password",
                AuthError::TokenNotFound | AuthError::TokenRevoked | AuthError::TokenExpired => {
                    "Invalid or expired refresh token"
                }
                _ => "Invalid or expired token",
            };
            ("UNAUTHORIZED", message.to_string())
        } else {
            match &self {
                AuthError::Forbidden => ("FORBIDDEN", self.to_string()),
                AuthError::Conflict(_) => ("CONFLICT", self.to_string()),
                AuthError::Validation(_) => ("INVALID_REQUEST", self.to_string()),
                AuthError::NotFound(_) => ("NOT_FOUND", self.to_string()),
                other => {
                    tracing::error!("服务内部错误: {}", other);
                    ("INTERNAL_ERROR", "internal server error".to_string())
                }
            }
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_collapse_to_unauthorized() {
        let errors = vec![
            AuthError::InvalidCredentials,
            AuthError::MissingToken,
            AuthError::InvalidAuthHeader,
            AuthError::TokenNotFound,
            AuthError::TokenRevoked,
            AuthError::TokenExpired,
            AuthError::InvalidSignature,
            AuthError::Expired,
            AuthError::Malformed,
            AuthError::MissingIdentity,
        ];

        for error in errors {
            assert_eq!(error.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_forbidden_distinct_from_unauthorized() {
        assert!(!AuthError::Forbidden.is_unauthorized());
        assert_eq!(
            AuthError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_store_error_is_server_error() {
        let err = AuthError::from(StoreError::Unavailable("connection reset".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_store_details_not_leaked() {
        let err = AuthError::from(StoreError::Unavailable("password=hunter2".into()));
        let body = axum::body::to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("INTERNAL_ERROR"));
    }
}
